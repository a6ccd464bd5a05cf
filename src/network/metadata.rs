use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;

/// Class label (dataset directory name) → output index.
pub type ClassToIdx = BTreeMap<String, usize>;

/// Class label → human-readable flower name, as in `cat_to_name.json`.
pub type CategoryNames = BTreeMap<String, String>;

/// Loads a `{"<label>": "<name>", ...}` lookup table.
pub fn load_category_names(path: &Path) -> Result<CategoryNames> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

/// Names ordered by output index; labels without a name keep their label.
pub fn output_labels(class_to_idx: &ClassToIdx, names: &CategoryNames) -> Vec<String> {
    let mut by_index: Vec<(usize, &String)> = class_to_idx.iter().map(|(label, &i)| (i, label)).collect();
    by_index.sort();
    by_index
        .into_iter()
        .map(|(_, label)| names.get(label).cloned().unwrap_or_else(|| label.clone()))
        .collect()
}
