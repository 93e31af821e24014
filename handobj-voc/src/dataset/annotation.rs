use super::*;
use crate::{
    common::*,
    error::{ensure_exists, DatasetError},
};
use roxmltree::Node;

/// Scale applied to the annotated contact vector magnitude.
pub const MAGNITUDE_SCALE: f32 = 0.001;

/// A parsed annotation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub objects: Vec<ObjectAnnotation>,
}

/// One `object` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    /// Normalized class name.
    pub class_name: String,
    pub class_index: usize,
    /// The box as written in the file, 1-based.
    pub bbox: XYXY<f32>,
    pub difficult: i32,
    pub hand: HandAttributes,
    /// Box of the object a hand is in contact with, 1-based.
    pub contact_object: Option<XYXY<f32>>,
}

/// Hand contact attributes. Absent values are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HandAttributes {
    pub contact_state: i32,
    pub contact_right: i32,
    pub contact_left: i32,
    /// Already multiplied by [MAGNITUDE_SCALE].
    pub magnitude: f32,
    pub unit_dx: f32,
    pub unit_dy: f32,
    pub hand_side: i32,
}

/// Parse the annotation file at `path`.
pub fn parse_annotation_file(path: impl AsRef<Path>) -> Result<Annotation> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let bytes = fs::read(path)
        .with_context(|| format!("failed to read annotation file '{}'", path.display()))?;
    let text = decode_xml_bytes(bytes, path)?;
    parse_annotation_str(&text, path)
}

/// Decode UTF-8 text, or Latin-1 text when the XML declaration says so.
fn decode_xml_bytes(bytes: Vec<u8>, path: &Path) -> Result<String> {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return Ok(text),
        Err(err) => err.into_bytes(),
    };

    let declaration = String::from_utf8_lossy(&bytes[..bytes.len().min(100)]).to_lowercase();
    let is_latin1 = ["iso-8859-1", "latin-1", "latin1"]
        .iter()
        .any(|name| declaration.contains(name));
    if !is_latin1 {
        return Err(DatasetError::malformed(path, "annotation is not valid UTF-8").into());
    }
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Parse annotation XML text. `path` is only used in error messages.
///
/// Every `object` child of the root element is taken, wherever it appears.
pub fn parse_annotation_str(text: &str, path: &Path) -> Result<Annotation> {
    let doc = roxmltree::Document::parse(text).map_err(|err| DatasetError::malformed(path, err))?;
    let objects: Vec<_> = doc
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("object"))
        .map(|node| parse_object(node, path))
        .try_collect()?;
    Ok(Annotation { objects })
}

fn parse_object(object: Node<'_, '_>, path: &Path) -> Result<ObjectAnnotation> {
    let field = |tag: &str| OptionalText::child(object, tag);

    let name = field("name")
        .raw()
        .ok_or_else(|| DatasetError::malformed(path, "missing object name"))?;
    let class_index =
        foreground_class_index(name).ok_or_else(|| DatasetError::UnknownClass {
            path: path.to_owned(),
            name: name.to_owned(),
        })?;
    let class_name = CLASSES[class_index].to_owned();

    let bbox = {
        let bndbox = object
            .children()
            .find(|node| node.has_tag_name("bndbox"))
            .ok_or_else(|| DatasetError::malformed(path, "missing bndbox"))?;
        let coord = |tag: &str| -> Result<f32> {
            OptionalText::child(bndbox, tag)
                .decode::<f32>(path, tag)?
                .ok_or_else(|| {
                    Error::from(DatasetError::malformed(
                        path,
                        format!("missing bndbox/{}", tag),
                    ))
                })
        };
        let xyxy = [coord("xmin")?, coord("ymin")?, coord("xmax")?, coord("ymax")?];
        // inverted corners cannot be stored in the roidb
        XYXY::try_from_xyxy(xyxy).map_err(|err| DatasetError::malformed(path, err))?
    };

    let float = |tag: &str| -> Result<f32> {
        Ok(field(tag).decode::<f32>(path, tag)?.unwrap_or(0.0))
    };
    let int = |tag: &str| decode_int(&field(tag), path, tag);

    let hand = HandAttributes {
        contact_state: int("contactstate")?,
        contact_right: int("contactright")?,
        contact_left: int("contactleft")?,
        magnitude: float("magnitude")? * MAGNITUDE_SCALE,
        unit_dx: float("unitdx")?,
        unit_dy: float("unitdy")?,
        hand_side: int("handside")?,
    };

    let contact_object = {
        let coords = [
            field("objxmin").decode::<f32>(path, "objxmin")?,
            field("objymin").decode::<f32>(path, "objymin")?,
            field("objxmax").decode::<f32>(path, "objxmax")?,
            field("objymax").decode::<f32>(path, "objymax")?,
        ];
        match coords {
            [Some(x1), Some(y1), Some(x2), Some(y2)] => Some(
                XYXY::try_from_xyxy([x1, y1, x2, y2])
                    .map_err(|err| DatasetError::malformed(path, err))?,
            ),
            _ => None,
        }
    };

    Ok(ObjectAnnotation {
        class_name,
        class_index,
        bbox,
        // a malformed flag counts as not difficult
        difficult: int("difficult").unwrap_or(0),
        hand,
        contact_object,
    })
}

/// Integer attributes also accept float text, which is truncated.
fn decode_int(field: &OptionalText<'_>, path: &Path, tag: &str) -> Result<i32> {
    let value = match field.raw() {
        Some(text) => match text.parse::<i32>() {
            Ok(value) => value,
            Err(_) => match text.parse::<f64>() {
                Ok(value) if value.is_finite() => value.trunc() as i32,
                _ => {
                    return Err(DatasetError::malformed(
                        path,
                        format!("invalid integer '{}' in '{}'", text, tag),
                    )
                    .into())
                }
            },
        },
        None => 0,
    };
    Ok(value)
}

/// The text of an optional element.
///
/// The element is legitimate only if it is present, has text and the text
/// is not the literal `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalText<'a> {
    text: Option<&'a str>,
}

impl<'a> OptionalText<'a> {
    /// The first `tag` child of `node`.
    pub fn child(node: Node<'a, '_>, tag: &str) -> Self {
        let text = node
            .children()
            .find(|child| child.has_tag_name(tag))
            .and_then(|child| child.text());
        Self { text }
    }

    /// The trimmed text of a legitimate element.
    pub fn raw(&self) -> Option<&'a str> {
        let text = self.text?.trim();
        if text.is_empty() || text == "None" {
            return None;
        }
        Some(text)
    }

    pub fn decode<T>(&self, path: &Path, tag: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        self.raw()
            .map(|text| {
                text.parse::<T>().map_err(|err| {
                    Error::from(DatasetError::malformed(
                        path,
                        format!("invalid value '{}' in '{}': {}", text, tag, err),
                    ))
                })
            })
            .transpose()
    }
}
