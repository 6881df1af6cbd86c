//! Parsers for the four CUB-200-2011 annotation files.
//!
//! Every file is line oriented: `<int id> <value>`, split on single spaces
//! with a max-split of 2. A line must yield exactly two fields.

use crate::types::{CubDatasetError, DatasetResult};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const TRAIN_TEST_SPLIT_FILE: &str = "train_test_split.txt";
pub const IMAGES_FILE: &str = "images.txt";
pub const CLASSES_FILE: &str = "classes.txt";
pub const IMAGE_CLASS_LABELS_FILE: &str = "image_class_labels.txt";

/// All annotation files, in the order they are fingerprinted.
pub const ANNOTATION_FILES: [&str; 4] = [
    TRAIN_TEST_SPLIT_FILE,
    IMAGES_FILE,
    CLASSES_FILE,
    IMAGE_CLASS_LABELS_FILE,
];

/// Official train/test assignment, ids kept in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitIds {
    pub train: Vec<u32>,
    pub test: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationTables {
    pub split_ids: SplitIds,
    pub image_paths: HashMap<u32, PathBuf>,
    /// 1-based class id to class name.
    pub class_names: HashMap<u32, String>,
    /// Image id to 1-based class id.
    pub image_labels: HashMap<u32, u32>,
}

impl AnnotationTables {
    pub fn load(dataset_dir: &Path, image_dir: &Path) -> DatasetResult<Self> {
        let split_ids = read_train_test_split(&dataset_dir.join(TRAIN_TEST_SPLIT_FILE))?;
        let image_paths = read_image_paths(&dataset_dir.join(IMAGES_FILE), image_dir)?;
        let class_names = read_class_names(&dataset_dir.join(CLASSES_FILE))?;
        let image_labels = read_image_labels(&dataset_dir.join(IMAGE_CLASS_LABELS_FILE))?;
        debug!(
            train = split_ids.train.len(),
            test = split_ids.test.len(),
            images = image_paths.len(),
            classes = class_names.len(),
            labels = image_labels.len(),
            "parsed annotation tables"
        );
        Ok(Self {
            split_ids,
            image_paths,
            class_names,
            image_labels,
        })
    }
}

struct Line<'a> {
    number: usize,
    id: u32,
    value: &'a str,
}

fn parse_error(path: &Path, line: usize, msg: impl Into<String>) -> CubDatasetError {
    CubDatasetError::Parse {
        path: path.to_path_buf(),
        line,
        msg: msg.into(),
    }
}

fn read_text(path: &Path) -> DatasetResult<String> {
    fs::read_to_string(path).map_err(|e| CubDatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn split_lines<'a>(path: &Path, contents: &'a str, schema: &str) -> DatasetResult<Vec<Line<'a>>> {
    let mut out = Vec::new();
    for (idx, raw) in contents.lines().enumerate() {
        let number = idx + 1;
        let fields: Vec<&str> = raw.splitn(3, ' ').collect();
        if fields.len() != 2 {
            return Err(parse_error(
                path,
                number,
                format!("expected `{schema}`, got {} field(s) in {raw:?}", fields.len()),
            ));
        }
        let id = fields[0].parse::<u32>().map_err(|e| {
            parse_error(path, number, format!("invalid id {:?}: {e}", fields[0]))
        })?;
        out.push(Line {
            number,
            id,
            value: fields[1],
        });
    }
    Ok(out)
}

fn parse_int(path: &Path, line: &Line<'_>, what: &str) -> DatasetResult<u32> {
    line.value.parse::<u32>().map_err(|e| {
        parse_error(path, line.number, format!("invalid {what} {:?}: {e}", line.value))
    })
}

fn insert_unique<V>(
    map: &mut HashMap<u32, V>,
    path: &Path,
    line: &Line<'_>,
    value: V,
) -> DatasetResult<()> {
    match map.entry(line.id) {
        Entry::Occupied(_) => Err(parse_error(
            path,
            line.number,
            format!("duplicate id {}", line.id),
        )),
        Entry::Vacant(slot) => {
            slot.insert(value);
            Ok(())
        }
    }
}

/// `<image id> <is_train flag>`; flag `1` marks train, anything else test.
pub fn read_train_test_split(path: &Path) -> DatasetResult<SplitIds> {
    let contents = read_text(path)?;
    let mut ids = SplitIds::default();
    let mut seen = HashSet::new();
    for line in split_lines(path, &contents, "<image id> <is_train>")? {
        let flag = parse_int(path, &line, "train flag")?;
        if !seen.insert(line.id) {
            return Err(parse_error(path, line.number, format!("duplicate id {}", line.id)));
        }
        if flag == 1 {
            ids.train.push(line.id);
        } else {
            ids.test.push(line.id);
        }
    }
    Ok(ids)
}

/// `<image id> <relative path>`; paths are joined onto `image_dir`.
pub fn read_image_paths(path: &Path, image_dir: &Path) -> DatasetResult<HashMap<u32, PathBuf>> {
    let contents = read_text(path)?;
    let mut out = HashMap::new();
    for line in split_lines(path, &contents, "<image id> <relative path>")? {
        if line.value.is_empty() {
            return Err(parse_error(path, line.number, "empty image path"));
        }
        let full = image_dir.join(line.value);
        insert_unique(&mut out, path, &line, full)?;
    }
    Ok(out)
}

/// `<class id> <class name>`; class ids are 1-based.
pub fn read_class_names(path: &Path) -> DatasetResult<HashMap<u32, String>> {
    let contents = read_text(path)?;
    let mut out = HashMap::new();
    for line in split_lines(path, &contents, "<class id> <class name>")? {
        if line.id == 0 {
            return Err(parse_error(path, line.number, "class ids are 1-based"));
        }
        insert_unique(&mut out, path, &line, line.value.to_string())?;
    }
    Ok(out)
}

/// `<image id> <class id>`; class ids are 1-based.
pub fn read_image_labels(path: &Path) -> DatasetResult<HashMap<u32, u32>> {
    let contents = read_text(path)?;
    let mut out = HashMap::new();
    for line in split_lines(path, &contents, "<image id> <class id>")? {
        let label = parse_int(path, &line, "class id")?;
        if label == 0 {
            return Err(parse_error(path, line.number, "class ids are 1-based"));
        }
        insert_unique(&mut out, path, &line, label)?;
    }
    Ok(out)
}
