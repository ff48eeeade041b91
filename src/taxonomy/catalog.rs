use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("category catalog not found at {0}")]
    Missing(String),
    #[error("unable to read category catalog {path}: {message}")]
    Read { path: String, message: String },
    #[error("category catalog is not a JSON list of strings: {0}")]
    Parse(String),
    #[error("category catalog contains no categories")]
    Empty,
}

/// Ordered hierarchical category paths plus the leaf subset derived from
/// them at load time.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    paths: Vec<String>,
    leaves: Vec<String>,
    delimiter: String,
}

impl CategoryCatalog {
    pub fn new<I, S>(paths: I, delimiter: &str) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let paths: Vec<String> = paths
            .into_iter()
            .map(Into::into)
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .filter(|path| seen.insert(path.clone()))
            .collect();
        if paths.is_empty() {
            return Err(CatalogError::Empty);
        }
        let leaves = leaf_paths(&paths, delimiter);
        Ok(Self {
            paths,
            leaves,
            delimiter: delimiter.to_string(),
        })
    }

    /// Loads a JSON array of paths, or one path per line for `.txt` files.
    pub fn load(path: &Path, delimiter: &str) -> Result<Self, CatalogError> {
        let shown = path.display().to_string();
        if !path.exists() {
            return Err(CatalogError::Missing(shown));
        }
        let raw = std::fs::read_to_string(path).map_err(|err| CatalogError::Read {
            path: shown.clone(),
            message: err.to_string(),
        })?;
        let is_text = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        let catalog = if is_text {
            Self::new(raw.lines(), delimiter)?
        } else {
            Self::from_json(&raw, delimiter)?
        };
        info!(
            target = "forge.taxonomy",
            path = %shown,
            categories = catalog.paths().len(),
            leaves = catalog.leaves().len(),
            "category_catalog_loaded"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str, delimiter: &str) -> Result<Self, CatalogError> {
        let paths: Vec<String> =
            serde_json::from_str(raw).map_err(|err| CatalogError::Parse(err.to_string()))?;
        Self::new(paths, delimiter)
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

/// A path is a leaf unless some other path continues it with the delimiter.
fn leaf_paths(paths: &[String], delimiter: &str) -> Vec<String> {
    let mut parents: HashSet<&str> = HashSet::new();
    for path in paths {
        for (idx, _) in path.match_indices(delimiter) {
            parents.insert(&path[..idx]);
        }
    }
    paths
        .iter()
        .filter(|path| !parents.contains(path.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DELIM: &str = " > ";

    fn sample() -> CategoryCatalog {
        CategoryCatalog::new(
            [
                "Jewelry",
                "Jewelry > Rings",
                "Jewelry > Rings > Wedding Bands",
                "Jewelry > Necklaces",
                "Home & Living",
                "Home & Living > Bathroom > Faucets",
                "Jewelry > Rings Extra",
            ],
            DELIM,
        )
        .expect("catalog")
    }

    #[test]
    fn leaves_exclude_every_ancestor() {
        let catalog = sample();
        assert_eq!(
            catalog.leaves(),
            &[
                "Jewelry > Rings > Wedding Bands".to_string(),
                "Jewelry > Necklaces".to_string(),
                "Home & Living > Bathroom > Faucets".to_string(),
                "Jewelry > Rings Extra".to_string(),
            ]
        );
    }

    #[test]
    fn no_leaf_is_continued_by_another_path() {
        let catalog = sample();
        for leaf in catalog.leaves() {
            let prefix = format!("{leaf}{DELIM}");
            assert!(
                !catalog.paths().iter().any(|other| other.starts_with(&prefix)),
                "{leaf} has a child"
            );
        }
    }

    #[test]
    fn duplicates_and_blanks_are_dropped() {
        let catalog = CategoryCatalog::new(["A > B", "", "A > B", "  C "], DELIM).expect("catalog");
        assert_eq!(catalog.paths(), &["A > B".to_string(), "C".to_string()]);
        assert!(matches!(
            CategoryCatalog::new(Vec::<String>::new(), DELIM),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn loads_json_and_text_files() {
        let dir = tempfile::tempdir().expect("tempdir");

        let json_path = dir.path().join("categories.json");
        std::fs::write(&json_path, r#"["Art", "Art > Prints", "Art > Painting"]"#).expect("write");
        let catalog = CategoryCatalog::load(&json_path, DELIM).expect("json");
        assert_eq!(catalog.leaves().len(), 2);

        let text_path = dir.path().join("categories.txt");
        let mut file = std::fs::File::create(&text_path).expect("create");
        writeln!(file, "Toys\nToys > Puzzles\n").expect("write");
        let catalog = CategoryCatalog::load(&text_path, DELIM).expect("text");
        assert_eq!(catalog.leaves(), &["Toys > Puzzles".to_string()]);
    }

    #[test]
    fn missing_or_malformed_files_fail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            CategoryCatalog::load(&missing, DELIM),
            Err(CatalogError::Missing(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"not": "a list"}"#).expect("write");
        assert!(matches!(CategoryCatalog::load(&bad, DELIM), Err(CatalogError::Parse(_))));
    }
}
