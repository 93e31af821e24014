use crate::common::*;

pub const BACKGROUND_CLASS: &str = "__background__";
pub const TARGET_OBJECT_CLASS: &str = "targetobject";
pub const HAND_CLASS: &str = "hand";

/// The fixed class vocabulary. The position is the class index.
pub const CLASSES: [&str; 3] = [BACKGROUND_CLASS, TARGET_OBJECT_CLASS, HAND_CLASS];

pub fn class_set() -> IndexSet<String> {
    CLASSES.iter().map(|&name| name.to_owned()).collect()
}

/// Look up a class name as written in an annotation.
///
/// The name is lower-cased and trimmed first. The background class is never
/// produced from annotations.
pub fn foreground_class_index(name: &str) -> Option<usize> {
    let name = name.trim().to_lowercase();
    CLASSES
        .iter()
        .position(|&class| class == name)
        .filter(|&index| index != 0)
}
