//! Just enough of the protobuf wire format to pull a float initializer out of an
//! ONNX model file. The swap model keeps its embedding projection matrix as the
//! last graph initializer, which ONNX Runtime doesn't expose.

use anyhow::{Error, Result, bail};

// ModelProto.graph
const MODEL_GRAPH: u64 = 7;
// GraphProto.initializer
const GRAPH_INITIALIZER: u64 = 5;
// TensorProto fields
const TENSOR_DIMS: u64 = 1;
const TENSOR_DATA_TYPE: u64 = 2;
const TENSOR_FLOAT_DATA: u64 = 4;
const TENSOR_NAME: u64 = 8;
const TENSOR_RAW_DATA: u64 = 9;

const DATA_TYPE_FLOAT: u64 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    pub name: String,
    pub dims: Vec<usize>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
enum Value<'a> {
    Varint(u64),
    Fixed64,
    Bytes(&'a [u8]),
    Fixed32([u8; 4]),
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self
                .buf
                .get(self.pos)
                .ok_or_else(|| Error::msg("truncated varint"))?;
            self.pos += 1;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint too long")
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| Error::msg("truncated field"))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn field(&mut self) -> Result<Option<(u64, Value<'a>)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }
        let key = self.varint()?;
        let value = match key & 0x7 {
            0 => Value::Varint(self.varint()?),
            1 => {
                self.take(8)?;
                Value::Fixed64
            }
            2 => {
                let len = self.varint()? as usize;
                Value::Bytes(self.take(len)?)
            }
            5 => {
                let mut word = [0u8; 4];
                word.copy_from_slice(self.take(4)?);
                Value::Fixed32(word)
            }
            wire => bail!("unsupported wire type {wire}"),
        };
        Ok(Some((key >> 3, value)))
    }
}

/// The last initializer of the model's graph.
pub fn last_initializer(model: &[u8]) -> Result<Initializer> {
    let mut graph = None;
    let mut reader = Reader::new(model);
    while let Some((field, value)) = reader.field()? {
        if let (MODEL_GRAPH, Value::Bytes(bytes)) = (field, value) {
            graph = Some(bytes);
        }
    }
    let graph = graph.ok_or_else(|| Error::msg("model has no graph"))?;

    let mut last = None;
    let mut reader = Reader::new(graph);
    while let Some((field, value)) = reader.field()? {
        if let (GRAPH_INITIALIZER, Value::Bytes(bytes)) = (field, value) {
            last = Some(bytes);
        }
    }
    let tensor = last.ok_or_else(|| Error::msg("graph has no initializers"))?;

    parse_tensor(tensor)
}

fn parse_tensor(tensor: &[u8]) -> Result<Initializer> {
    let mut name = String::new();
    let mut dims = Vec::new();
    let mut data_type = 0;
    let mut data = Vec::new();

    let mut reader = Reader::new(tensor);
    while let Some((field, value)) = reader.field()? {
        match (field, value) {
            (TENSOR_DIMS, Value::Varint(d)) => dims.push(d as usize),
            (TENSOR_DIMS, Value::Bytes(packed)) => {
                let mut packed = Reader::new(packed);
                while packed.pos < packed.buf.len() {
                    dims.push(packed.varint()? as usize);
                }
            }
            (TENSOR_DATA_TYPE, Value::Varint(t)) => data_type = t,
            (TENSOR_FLOAT_DATA, Value::Fixed32(word)) => data.push(f32::from_le_bytes(word)),
            (TENSOR_FLOAT_DATA, Value::Bytes(packed)) | (TENSOR_RAW_DATA, Value::Bytes(packed)) => {
                data.extend(
                    packed
                        .chunks_exact(4)
                        .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]])),
                );
            }
            (TENSOR_NAME, Value::Bytes(bytes)) => name = String::from_utf8_lossy(bytes).into_owned(),
            _ => {}
        }
    }

    if data_type != DATA_TYPE_FLOAT {
        bail!("initializer {name} has data type {data_type}, expected float");
    }
    let expected: usize = dims.iter().product();
    if expected != data.len() {
        bail!(
            "initializer {name} has {} values for dims {dims:?}",
            data.len()
        );
    }

    Ok(Initializer { name, dims, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn varint(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                return;
            }
            out.push(byte | 0x80);
        }
    }

    fn bytes_field(field: u64, bytes: &[u8], out: &mut Vec<u8>) {
        varint(field << 3 | 2, out);
        varint(bytes.len() as u64, out);
        out.extend_from_slice(bytes);
    }

    fn varint_field(field: u64, v: u64, out: &mut Vec<u8>) {
        varint(field << 3, out);
        varint(v, out);
    }

    fn tensor(name: &str, dims: &[u64], values: &[f32]) -> Vec<u8> {
        let mut t = Vec::new();
        for d in dims {
            varint_field(TENSOR_DIMS, *d, &mut t);
        }
        varint_field(TENSOR_DATA_TYPE, DATA_TYPE_FLOAT, &mut t);
        bytes_field(TENSOR_NAME, name.as_bytes(), &mut t);
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        bytes_field(TENSOR_RAW_DATA, &raw, &mut t);
        t
    }

    fn model(initializers: &[Vec<u8>]) -> Vec<u8> {
        let mut graph = Vec::new();
        bytes_field(1, b"node-ish", &mut graph);
        for init in initializers {
            bytes_field(GRAPH_INITIALIZER, init, &mut graph);
        }

        let mut model = Vec::new();
        varint_field(1, 8, &mut model);
        bytes_field(2, b"pytorch", &mut model);
        bytes_field(MODEL_GRAPH, &graph, &mut model);
        model
    }

    #[test]
    fn reads_last_initializer() -> Result<()> {
        let bytes = model(&[
            tensor("weight", &[3], &[1., 2., 3.]),
            tensor("emap", &[2, 2], &[0.5, -1., 2.25, 4.]),
        ]);
        let init = last_initializer(&bytes)?;
        assert_eq!(init.name, "emap");
        assert_eq!(init.dims, vec![2, 2]);
        assert_eq!(init.data, vec![0.5, -1., 2.25, 4.]);
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shape() {
        let bytes = model(&[tensor("emap", &[2, 2], &[1., 2., 3.])]);
        assert!(last_initializer(&bytes).is_err());
    }

    #[test]
    fn rejects_model_without_initializers() {
        assert!(last_initializer(&model(&[])).is_err());
        assert!(last_initializer(&[]).is_err());
    }
}
