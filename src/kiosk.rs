use crate::booth::{Booth, View};
use crate::camera::capture_photo;
use crate::error::{BoothError, Result};
use crate::export::{Printer, save_download};
use crate::face::FaceEngine;
use crate::session::{Session, Stage};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style, Stylize};
use ratatui::text::Line;
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{DefaultTerminal, Frame};
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use tracing::{Level, error, info, span, warn};

/// Where `c` takes the user photo from.
#[derive(Debug, Clone)]
pub enum PhotoSource {
    Camera(Option<u32>),
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Quit,
}

/// Terminal front end for a single booth session.
pub struct Kiosk<'a, E: FaceEngine + ?Sized, P: Printer> {
    booth: Booth<'a, E, P>,
    session: Session,
    rng: StdRng,
    source: PhotoSource,
    download_dir: PathBuf,
    list: ListState,
    view: Option<View>,
    status: String,
}

impl<'a, E: FaceEngine + ?Sized, P: Printer> Kiosk<'a, E, P> {
    pub fn new(
        booth: Booth<'a, E, P>,
        source: PhotoSource,
        download_dir: PathBuf,
        rng: StdRng,
    ) -> Self {
        let mut kiosk = Kiosk {
            booth,
            session: Session::new(),
            rng,
            source,
            download_dir,
            list: ListState::default().with_selected(Some(0)),
            view: None,
            status: String::from("Welcome! Pick an outfit to get started."),
        };
        kiosk.refresh();
        kiosk
    }

    pub fn run(mut self) -> anyhow::Result<()> {
        let mut terminal = ratatui::init();
        let result = self.event_loop(&mut terminal);
        ratatui::restore();
        result
    }

    fn event_loop(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        loop {
            terminal.draw(|frame| self.draw(frame))?;

            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            // Swaps and captures take a while, show that something is happening.
            if let Some(busy) = busy_message(key.code) {
                self.status = busy.to_string();
                terminal.draw(|frame| self.draw(frame))?;
            }
            if self.handle_key(key.code) == Action::Quit {
                info!("Kiosk closed");
                return Ok(());
            }
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Action {
        let span = span!(Level::DEBUG, "handle_key", ?code);
        let _guard = span.enter();

        let outcome = match code {
            KeyCode::Char('q') | KeyCode::Esc => return Action::Quit,
            KeyCode::Up => {
                self.move_cursor(-1);
                Ok(None)
            }
            KeyCode::Down => {
                self.move_cursor(1);
                Ok(None)
            }
            KeyCode::Enter => Ok(self.list.selected().and_then(|i| self.select(i))),
            KeyCode::Char(c @ '1'..='9') => {
                let i = c as usize - '1' as usize;
                self.list.select(Some(i));
                Ok(self.select(i))
            }
            KeyCode::Char('c') => self.capture(),
            KeyCode::Char('s') => self
                .booth
                .swap(&mut self.session)
                .map(|r| Some(format!("All done! Result saved to {}", r.saved_path.display()))),
            KeyCode::Char('r') => self
                .booth
                .reshuffle(&mut self.session, &mut self.rng)
                .map(|r| Some(format!("New reference {}", r.path.display()))),
            KeyCode::Char('p') => self
                .booth
                .print(&self.session)
                .map(|_| Some(String::from("Sent to the printer"))),
            KeyCode::Char('d') => self.download(),
            _ => Ok(None),
        };

        match outcome {
            Ok(Some(message)) => self.status = message,
            Ok(None) => {}
            Err(e) => {
                if e.is_fatal() {
                    error!("{e}");
                } else {
                    warn!("{e}");
                }
                self.status = e.to_string();
            }
        }
        self.refresh();
        Action::Continue
    }

    fn select(&mut self, index: usize) -> Option<String> {
        let card = self.view.as_ref()?.cards.get(index)?;
        let (id, name) = (card.entry.id.clone(), card.entry.display_name());
        self.booth.select(&mut self.session, &id);
        Some(format!("{name} selected"))
    }

    fn capture(&mut self) -> Result<Option<String>> {
        match &self.source {
            PhotoSource::Camera(index) => {
                let img = capture_photo(*index).map_err(BoothError::Camera)?;
                self.booth.capture(&mut self.session, &img)?;
            }
            PhotoSource::File(path) => {
                self.booth.capture_file(&mut self.session, path)?;
            }
        }
        Ok(Some(String::from("Photo captured")))
    }

    fn download(&mut self) -> Result<Option<String>> {
        let download = self.booth.download(&self.session)?;
        let dest = save_download(&download, &self.download_dir)?;
        Ok(Some(format!("Downloaded to {}", dest.display())))
    }

    fn move_cursor(&mut self, delta: isize) {
        let count = self.view.as_ref().map_or(0, |v| v.cards.len());
        if count == 0 {
            return;
        }
        let current = self.list.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, count as isize - 1);
        self.list.select(Some(next as usize));
    }

    fn refresh(&mut self) {
        match self.booth.render(&mut self.session, &mut self.rng) {
            Ok(view) => {
                let count = view.cards.len();
                if count > 0 && self.list.selected().is_none_or(|i| i >= count) {
                    self.list.select(Some(count - 1));
                }
                self.view = Some(view);
            }
            Err(e) => {
                warn!("Failed to render booth: {e}");
                self.status = e.to_string();
            }
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let [main, status] =
            Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(frame.area());
        let [outfits, stage] =
            Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)])
                .areas(main);

        let items: Vec<ListItem> = self
            .view
            .iter()
            .flat_map(|v| v.cards.iter())
            .enumerate()
            .map(|(i, card)| {
                let mut label = format!("{}. {}", i + 1, card.entry.display_name());
                if !card.entry.is_usable() {
                    label.push_str(" (no images)");
                }
                let item = ListItem::new(label);
                if card.selected {
                    item.green().bold()
                } else {
                    item
                }
            })
            .collect();
        let list = List::new(items)
            .block(Block::bordered().title(" Outfits "))
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, outfits, &mut self.list);

        let lines = match &self.view {
            Some(view) => stage_lines(view),
            None => vec![Line::from("Loading...")],
        };
        frame.render_widget(
            Paragraph::new(lines)
                .block(Block::bordered().title(" Virtual Fitting Booth "))
                .wrap(Wrap { trim: false }),
            stage,
        );

        frame.render_widget(
            Paragraph::new(self.status.as_str()).block(Block::bordered()),
            status,
        );
    }
}

fn busy_message(code: KeyCode) -> Option<&'static str> {
    match code {
        KeyCode::Char('c') => Some("Capturing photo..."),
        KeyCode::Char('s') => Some("Swapping faces, hold still..."),
        KeyCode::Char('p') => Some("Printing..."),
        _ => None,
    }
}

fn hint(stage: Stage) -> &'static str {
    match stage {
        Stage::SelectOutfit => "Pick an outfit with Up/Down and Enter, or press its number",
        Stage::CapturePhoto => "Press c to capture your photo",
        Stage::SampleReference => "This outfit has no reference images, pick another one",
        Stage::ExecuteSwap => "Press s to try it on, r for a different reference",
        Stage::Done => "Press p to print or d to download, r to try another reference",
    }
}

fn stage_lines(view: &View) -> Vec<Line<'static>> {
    let show = |label: &str, path: Option<&Path>| {
        let value = path.map_or_else(|| String::from("-"), |p| p.display().to_string());
        Line::from(format!("{label:<10} {value}"))
    };

    let mut lines = vec![
        Line::from(hint(view.stage)).bold(),
        Line::default(),
        show("Preview", view.preview.as_deref()),
        show("Photo", view.photo.as_deref()),
        show("Reference", view.reference.as_ref().map(|r| r.path.as_path())),
        show("Result", view.result.as_deref()),
    ];
    if !view.warnings.is_empty() {
        lines.push(Line::default());
        lines.extend(view.warnings.iter().map(|w| Line::from(w.clone()).yellow()));
    }
    lines.push(Line::default());
    lines.push(Line::from("c capture  s swap  r reshuffle  p print  d download  q quit").dim());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DOWNLOAD_FILE, Layout as Dirs};
    use crate::orchestrator::tests::{StubEngine, write_image};
    use anyhow::Result;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    struct NoPrinter;

    impl Printer for NoPrinter {
        fn print(&self, _path: &Path) -> crate::error::Result<()> {
            Err(BoothError::PrintUnsupported("test"))
        }
    }

    fn setup() -> Result<(TempDir, Dirs, PathBuf)> {
        let root = tempfile::tempdir()?;
        let dirs = Dirs::new(root.path());
        dirs.ensure_dirs()?;
        write_image(&dirs.refs.join("outfit_1/ref_1.png"), 1, 24)?;
        write_image(&dirs.refs.join("outfit_2/ref_1.png"), 1, 24)?;
        let selfie = root.path().join("selfie.png");
        write_image(&selfie, 1, 16)?;
        Ok((root, dirs, selfie))
    }

    fn kiosk<'a>(
        dirs: &Dirs,
        engine: &'a StubEngine,
        selfie: &Path,
    ) -> Kiosk<'a, StubEngine, NoPrinter> {
        Kiosk::new(
            Booth::new(dirs.clone(), engine, NoPrinter),
            PhotoSource::File(selfie.to_path_buf()),
            dirs.outputs.join("downloads"),
            StdRng::seed_from_u64(9),
        )
    }

    #[test]
    fn keys_drive_the_workflow() -> Result<()> {
        let (_root, dirs, selfie) = setup()?;
        let engine = StubEngine::default();
        let mut kiosk = kiosk(&dirs, &engine, &selfie);
        assert_eq!(kiosk.view.as_ref().map(|v| v.cards.len()), Some(2));

        assert_eq!(kiosk.handle_key(KeyCode::Char('2')), Action::Continue);
        assert_eq!(kiosk.session.current(), Some("outfit_2"));

        kiosk.handle_key(KeyCode::Char('c'));
        assert!(kiosk.session.photo().is_some());
        assert_eq!(kiosk.session.stage(), Stage::ExecuteSwap);

        kiosk.handle_key(KeyCode::Char('s'));
        assert_eq!(kiosk.session.stage(), Stage::Done);
        assert!(kiosk.status.starts_with("All done!"), "{}", kiosk.status);

        kiosk.handle_key(KeyCode::Char('d'));
        let saved = dirs.outputs.join("downloads").join(DOWNLOAD_FILE);
        assert_eq!(fs::read(saved)?, fs::read(dirs.result())?);

        kiosk.handle_key(KeyCode::Char('p'));
        assert!(kiosk.status.contains("only supported on Windows"));
        assert_eq!(kiosk.session.stage(), Stage::Done);

        assert_eq!(kiosk.handle_key(KeyCode::Char('q')), Action::Quit);
        Ok(())
    }

    #[test]
    fn arrows_move_cursor_and_enter_selects() -> Result<()> {
        let (_root, dirs, selfie) = setup()?;
        let engine = StubEngine::default();
        let mut kiosk = kiosk(&dirs, &engine, &selfie);

        kiosk.handle_key(KeyCode::Up);
        assert_eq!(kiosk.list.selected(), Some(0));
        kiosk.handle_key(KeyCode::Down);
        kiosk.handle_key(KeyCode::Down);
        assert_eq!(kiosk.list.selected(), Some(1));
        assert_eq!(kiosk.session.current(), None);

        kiosk.handle_key(KeyCode::Enter);
        assert_eq!(kiosk.session.current(), Some("outfit_2"));
        assert!(kiosk.view.as_ref().is_some_and(|v| v.cards[1].selected));
        Ok(())
    }

    #[test]
    fn out_of_order_keys_report_what_is_missing() -> Result<()> {
        let (_root, dirs, selfie) = setup()?;
        let engine = StubEngine::default();
        let mut kiosk = kiosk(&dirs, &engine, &selfie);

        kiosk.handle_key(KeyCode::Char('s'));
        assert_eq!(kiosk.status, BoothError::NoOutfitSelected.to_string());

        kiosk.handle_key(KeyCode::Char('1'));
        kiosk.handle_key(KeyCode::Char('s'));
        assert_eq!(kiosk.status, BoothError::NoPhotoCaptured.to_string());

        kiosk.handle_key(KeyCode::Char('d'));
        assert_eq!(kiosk.status, BoothError::NoResult.to_string());

        kiosk.handle_key(KeyCode::Char('9'));
        assert_eq!(kiosk.session.current(), Some("outfit_1"));
        assert_eq!(engine.swaps.get(), 0);
        Ok(())
    }

    #[test]
    fn missing_photo_file_is_not_fatal() -> Result<()> {
        let (_root, dirs, _selfie) = setup()?;
        let engine = StubEngine::default();
        let mut kiosk = kiosk(&dirs, &engine, &dirs.uploads.join("nope.png"));

        kiosk.handle_key(KeyCode::Char('1'));
        assert_eq!(kiosk.handle_key(KeyCode::Char('c')), Action::Continue);
        assert!(kiosk.session.photo().is_none());
        assert!(kiosk.status.starts_with("image error"), "{}", kiosk.status);
        Ok(())
    }
}
