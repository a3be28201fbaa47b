//! Safetensors I/O for continuous recordings.
//!
//! Reader: `raw.safetensors` holding `data [C, T]`, `sfreq [1]`, and
//! optionally `events [n, 3]` and newline-joined `ch_names` bytes.
//! Writer: [`StWriter`], a minimal builder for F32/F64/I32/I64 tensors.
use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

// ── Low-level safetensors parser ────────────────────────────────────────────

struct Tensors<'a> {
    header: HashMap<String, Value>,
    body: &'a [u8],
}

impl<'a> Tensors<'a> {
    fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < 8 {
            bail!("safetensors file too small");
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len);
        let Some(end) = usize::try_from(n)
            .ok()
            .and_then(|n| 8usize.checked_add(n))
            .filter(|&end| end <= bytes.len())
        else {
            bail!("safetensors header truncated ({n} bytes announced)");
        };
        let header: HashMap<String, Value> =
            serde_json::from_slice(&bytes[8..end]).context("failed to parse safetensors header")?;
        Ok(Self { header, body: &bytes[end..] })
    }

    fn has(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<&Value> {
        self.header.get(name).with_context(|| format!("missing '{name}' tensor"))
    }

    fn shape(&self, name: &str) -> Result<Vec<usize>> {
        self.entry(name)?["shape"]
            .as_array()
            .with_context(|| format!("'{name}': missing shape"))?
            .iter()
            .map(|v| v.as_u64().map(|d| d as usize).context("non-integer dimension"))
            .collect()
    }

    fn raw(&self, name: &str) -> Result<(&str, &'a [u8])> {
        let entry = self.entry(name)?;
        let dtype = entry["dtype"].as_str().with_context(|| format!("'{name}': missing dtype"))?;
        let offsets = entry["data_offsets"]
            .as_array()
            .with_context(|| format!("'{name}': missing data_offsets"))?;
        let (s, e) = match offsets.as_slice() {
            [s, e] => (
                s.as_u64().context("bad offset")? as usize,
                e.as_u64().context("bad offset")? as usize,
            ),
            _ => bail!("'{name}': data_offsets must have two entries"),
        };
        if s > e || e > self.body.len() {
            bail!("'{name}': data_offsets [{s}, {e}] outside the file");
        }
        Ok((dtype, &self.body[s..e]))
    }

    /// Any float or integer tensor, widened to f64.
    fn f64s(&self, name: &str) -> Result<Vec<f64>> {
        let (dtype, raw) = self.raw(name)?;
        Ok(match dtype {
            "F32" => raw
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
                .collect(),
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "I32" | "I64" => self.i64s(name)?.into_iter().map(|v| v as f64).collect(),
            other => bail!("'{name}': unsupported dtype {other}"),
        })
    }

    fn i64s(&self, name: &str) -> Result<Vec<i64>> {
        let (dtype, raw) = self.raw(name)?;
        Ok(match dtype {
            "I32" => raw
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
                .collect(),
            "I64" => raw
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            other => bail!("'{name}': expected an integer tensor, got {other}"),
        })
    }

    fn matrix_f64(&self, name: &str) -> Result<Array2<f64>> {
        let shape = self.shape(name)?;
        let [rows, cols] = shape[..] else { bail!("'{name}': expected 2-D, got shape {shape:?}") };
        Ok(Array2::from_shape_vec((rows, cols), self.f64s(name)?)?)
    }

    fn matrix_i64(&self, name: &str) -> Result<Array2<i64>> {
        let shape = self.shape(name)?;
        let [rows, cols] = shape[..] else { bail!("'{name}': expected 2-D, got shape {shape:?}") };
        Ok(Array2::from_shape_vec((rows, cols), self.i64s(name)?)?)
    }
}

// ── Public structs ────────────────────────────────────────────────────────────

/// A continuous recording loaded from `raw.safetensors`.
pub struct RawData {
    /// [C, T] in original units.
    pub data: Array2<f64>,
    /// Sampling rate (Hz).
    pub sfreq: f64,
    /// MNE events table `[n, 3]`: sample, previous value, event code.
    pub events: Option<Array2<i64>>,
    /// Channel names (may be empty if not saved).
    pub ch_names: Vec<String>,
}

impl RawData {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let t = Tensors::parse(&bytes)?;

        let data = t.matrix_f64("data")?;
        let sfreq = *t.f64s("sfreq")?.first().context("empty 'sfreq' tensor")?;
        if sfreq <= 0.0 {
            bail!("sampling rate must be positive, got {sfreq}");
        }

        let events = if t.has("events") {
            let ev = t.matrix_i64("events")?;
            if ev.ncols() != 3 {
                bail!("'events' must be [n, 3], got {:?}", ev.dim());
            }
            Some(ev)
        } else {
            None
        };

        // Channel names are optional.
        let ch_names = if t.has("ch_names") {
            let (_, raw) = t.raw("ch_names")?;
            std::str::from_utf8(raw)?
                .split('\n')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        } else {
            vec![]
        };

        Ok(RawData { data, sfreq, events, ch_names })
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Simple safetensors file writer.
///
/// Usage:
/// ```rust,no_run
/// use icapp::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("sfreq", &[5000.0], &[1]);
/// w.add_i64("onsets", &[100, 400, 700], &[3]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f32(&mut self, name: &str, data: &[f32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F32", shape.to_vec()));
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_f64_arr2(&mut self, name: &str, arr: &Array2<f64>) {
        let data: Vec<f64> = arr.iter().copied().collect();
        self.add_f64(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_i64(&mut self, name: &str, data: &[i64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I64", shape.to_vec()));
    }

    /// Raw bytes stored as U8 (used for newline-joined channel names).
    pub fn add_bytes(&mut self, name: &str, data: &[u8]) {
        self.entries.push((name.to_string(), data.to_vec(), "U8", vec![data.len()]));
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let padded: Vec<u8> = hdr_bytes.into_iter()
            .chain(std::iter::repeat(b' ').take(pad))
            .collect();
        let mut f = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(padded.len() as u64).to_le_bytes())?;
        f.write_all(&padded)?;
        for (_, data, _, _) in &self.entries {
            f.write_all(data)?;
        }
        Ok(())
    }
}
