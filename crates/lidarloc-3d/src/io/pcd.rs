use std::collections::HashMap;
use std::io::{BufRead, Read};
use std::path::Path;

use crate::pointcloud::PointCloud;

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;
// upper bound on the up front allocation, the header is not trusted
const MAX_INITIAL_CAPACITY: usize = 1 << 16;

/// Error types for the PCD module.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read PCD file
    #[error("Failed to read PCD file")]
    Io(#[from] std::io::Error),

    /// Unsupported header field or data layout
    #[error("Unsupported PCD property: {0}")]
    UnsupportedProperty(String),

    /// Malformed PCD header
    #[error("Malformed PCD header")]
    MalformedHeader,

    /// Malformed ascii point record
    #[error("Malformed PCD point record at point {0}")]
    MalformedRecord(usize),

    /// Invalid PCD file extension
    #[error("Invalid PCD file extension. Got:{0}")]
    InvalidFileExtension(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DataEncoding {
    Ascii,
    Binary,
}

/// Describes a single field in a PCD point record
#[derive(Debug)]
struct PcdField {
    column: usize, // first ascii column, counting every element of the earlier fields
    offset: usize, // byte offset within a point
    size: usize,   // size of one element (bytes)
    kind: char,    // 'F' = float, 'U' = unsigned int, 'I' = signed int
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize,
    num_points: usize,
    encoding: DataEncoding,
}

impl PcdLayout {
    fn field(&self, name: &str) -> Result<&PcdField, PcdError> {
        self.fields
            .get(name)
            .ok_or_else(|| PcdError::UnsupportedProperty(format!("missing field {name}")))
    }
}

fn read_scalar(buf: &[u8], field: &PcdField) -> Result<f64, PcdError> {
    let slice = buf
        .get(field.offset..field.offset + field.size)
        .ok_or(PcdError::MalformedHeader)?;
    let value = match (field.kind, field.size) {
        ('F', 4) => f32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) as f64,
        ('F', 8) => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(slice);
            f64::from_le_bytes(bytes)
        }
        ('U', 1) => slice[0] as f64,
        ('U', 2) => u16::from_le_bytes([slice[0], slice[1]]) as f64,
        ('U', 4) => u32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) as f64,
        ('I', 1) => slice[0] as i8 as f64,
        ('I', 2) => i16::from_le_bytes([slice[0], slice[1]]) as f64,
        ('I', 4) => i32::from_le_bytes([slice[0], slice[1], slice[2], slice[3]]) as f64,
        (kind, size) => {
            return Err(PcdError::UnsupportedProperty(format!(
                "field type {kind}{size}"
            )))
        }
    };
    Ok(value)
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut field_names: Vec<String> = Vec::new();
    let mut sizes = Vec::new();
    let mut types = Vec::new();
    let mut counts = Vec::new();
    let mut points = 0usize;

    let encoding = loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Err(PcdError::MalformedHeader);
        }
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("DATA") => match it.next() {
                Some("ascii") => break DataEncoding::Ascii,
                Some("binary") => break DataEncoding::Binary,
                other => {
                    return Err(PcdError::UnsupportedProperty(format!(
                        "DATA {}",
                        other.unwrap_or_default()
                    )))
                }
            },
            Some("SIZE") => {
                sizes = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or(PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("COUNT") => {
                counts = it
                    .map(|v| v.parse::<usize>().map_err(|_| PcdError::MalformedHeader))
                    .collect::<Result<Vec<_>, _>>()?;
            }
            Some("POINTS") => {
                let token = it.next().ok_or(PcdError::MalformedHeader)?;
                points = token
                    .parse::<usize>()
                    .map_err(|_| PcdError::MalformedHeader)?;
            }
            Some("FIELDS") => field_names = it.map(String::from).collect(),
            _ => {}
        }
    };

    if field_names.is_empty()
        || sizes.len() != field_names.len()
        || types.len() != field_names.len()
        || (!counts.is_empty() && counts.len() != field_names.len())
    {
        return Err(PcdError::MalformedHeader);
    }

    // Compute byte offsets for each field
    let mut offset = 0usize;
    let mut column = 0usize;
    let mut fields = HashMap::new();

    for (index, name) in field_names.iter().enumerate() {
        // a missing COUNT line means one element per field
        let count = counts.get(index).copied().unwrap_or(1);
        let size = sizes[index];
        let kind = types[index];

        let is_position = matches!(name.as_str(), "x" | "y" | "z");
        if (is_position || name == "intensity") && count != 1 {
            return Err(PcdError::UnsupportedProperty(format!("COUNT {count} for {name}")));
        }
        if is_position && kind != 'F' {
            return Err(PcdError::UnsupportedProperty(format!("TYPE {kind} for {name}")));
        }

        let field_bytes = size.checked_mul(count).ok_or(PcdError::MalformedHeader)?;
        let field = PcdField {
            column,
            offset,
            size,
            kind,
        };
        offset = offset
            .checked_add(field_bytes)
            .ok_or(PcdError::MalformedHeader)?;
        column += count;

        if offset > MAX_POINT_STEP || fields.insert(name.clone(), field).is_some() {
            return Err(PcdError::MalformedHeader);
        }
    }

    if points == 0 || points > MAX_POINTS {
        return Err(PcdError::MalformedHeader);
    }

    Ok(PcdLayout {
        fields,
        point_step: offset,
        num_points: points,
        encoding,
    })
}

/// Read the points of a PCD stream whose header has already been parsed.
fn read_pcd_body<R: BufRead>(reader: &mut R, layout: &PcdLayout) -> Result<PointCloud, PcdError> {
    let (fx, fy, fz) = (layout.field("x")?, layout.field("y")?, layout.field("z")?);
    let fi = layout.fields.get("intensity");

    let capacity = layout.num_points.min(MAX_INITIAL_CAPACITY);
    let mut points = Vec::with_capacity(capacity);
    let mut intensities = fi.map(|_| Vec::with_capacity(capacity));

    match layout.encoding {
        DataEncoding::Binary => {
            let mut buffer = vec![0u8; layout.point_step];
            for _ in 0..layout.num_points {
                reader.read_exact(&mut buffer)?;
                points.push([
                    read_scalar(&buffer, fx)?,
                    read_scalar(&buffer, fy)?,
                    read_scalar(&buffer, fz)?,
                ]);
                if let (Some(f), Some(out)) = (fi, intensities.as_mut()) {
                    out.push(read_scalar(&buffer, f)? as f32);
                }
            }
        }
        DataEncoding::Ascii => {
            let mut lines = reader.lines();
            for i in 0..layout.num_points {
                let line = lines.next().ok_or(PcdError::MalformedRecord(i))??;
                let values = line
                    .split_whitespace()
                    .map(|v| v.parse::<f64>().map_err(|_| PcdError::MalformedRecord(i)))
                    .collect::<Result<Vec<_>, _>>()?;
                let get = |f: &PcdField| values.get(f.column).copied().ok_or(PcdError::MalformedRecord(i));
                points.push([get(fx)?, get(fy)?, get(fz)?]);
                if let (Some(f), Some(out)) = (fi, intensities.as_mut()) {
                    out.push(get(f)? as f32);
                }
            }
        }
    }

    Ok(PointCloud::from_parts(points, intensities))
}

/// Read a PCD file.
///
/// # Arguments
/// * `path` - Path to a `.pcd` file.
///
/// # Returns
/// A [`PointCloud`] containing the 3D points and, when the file has an `intensity` field,
/// one intensity per point.
///
/// # Supported formats
/// - `DATA ascii` and `DATA binary`
/// - XYZ as `F` fields, intensity as `F`, `U` or `I`
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let Some(file_ext) = path.as_ref().extension() else {
        return Err(PcdError::InvalidFileExtension("".into()));
    };

    if file_ext != "pcd" {
        return Err(PcdError::InvalidFileExtension(
            file_ext.to_string_lossy().to_string(),
        ));
    }

    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let layout = parse_pcd_layout(&mut reader)?;
    read_pcd_body(&mut reader, &layout)
}
