//! Category name to class index mapping.
//!
//! Class indices are written into every label file, so they must agree across
//! all splits of a dataset and across repeated runs over the same input.

use std::collections::{BTreeSet, HashMap};

use crate::error::{ConvertError, Result};
use crate::types::ImageRecord;

/// A bijection between category names and dense class indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryIndex {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl CategoryIndex {
    /// Index every distinct category of `records`, in lexicographic order.
    pub fn build(records: &[ImageRecord]) -> Result<Self> {
        let names: BTreeSet<&str> = records
            .iter()
            .flat_map(|record| record.annotations.iter())
            .map(|annotation| annotation.category.as_str())
            .collect();

        if names.is_empty() {
            return Err(ConvertError::EmptyCategorySet);
        }

        Self::from_names(names.into_iter().map(str::to_string).collect())
    }

    /// Use an explicit, already ordered list of class names.
    pub fn from_names(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(ConvertError::EmptyCategorySet);
        }

        let mut lookup = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if lookup.insert(name.clone(), id).is_some() {
                return Err(ConvertError::DuplicateCategory(name.clone()));
            }
        }

        Ok(Self { names, lookup })
    }

    pub fn get(&self, category: &str) -> Option<usize> {
        self.lookup.get(category).copied()
    }

    /// Class names ordered by index.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Build the category index over the full record set (all splits).
pub fn build_category_index(records: &[ImageRecord]) -> Result<CategoryIndex> {
    CategoryIndex::build(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Annotation;

    fn record(categories: &[&str]) -> ImageRecord {
        ImageRecord::new(
            "img.jpg",
            categories
                .iter()
                .map(|c| Annotation::new(*c, (0.0, 0.0), (1.0, 1.0)))
                .collect(),
        )
    }

    #[test]
    fn test_index_is_sorted() {
        let records = vec![record(&["Tops", "Jeans"]), record(&["Shoes", "Tops"])];
        let index = build_category_index(&records).unwrap();

        assert_eq!(index.names(), ["Jeans", "Shoes", "Tops"]);
        assert_eq!(index.get("Jeans"), Some(0));
        assert_eq!(index.get("Shoes"), Some(1));
        assert_eq!(index.get("Tops"), Some(2));
        assert_eq!(index.get("Hats"), None);
    }

    #[test]
    fn test_index_is_deterministic_under_reordering() {
        let forward = vec![record(&["b", "a"]), record(&[]), record(&["c", "a"])];
        let mut reversed = forward.clone();
        reversed.reverse();
        for r in reversed.iter_mut() {
            r.annotations.reverse();
        }

        let first = build_category_index(&forward).unwrap();
        let second = build_category_index(&forward).unwrap();
        let third = build_category_index(&reversed).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
    }

    #[test]
    fn test_empty_category_set() {
        let records = vec![record(&[]), record(&[])];
        assert!(matches!(
            build_category_index(&records),
            Err(ConvertError::EmptyCategorySet)
        ));
        assert!(matches!(
            build_category_index(&[]),
            Err(ConvertError::EmptyCategorySet)
        ));
    }

    #[test]
    fn test_explicit_names_keep_order() {
        let index = CategoryIndex::from_names(vec!["Tops".into(), "Jeans".into()]).unwrap();
        assert_eq!(index.get("Tops"), Some(0));
        assert_eq!(index.get("Jeans"), Some(1));
    }

    #[test]
    fn test_explicit_names_reject_duplicates() {
        let result = CategoryIndex::from_names(vec!["Tops".into(), "Tops".into()]);
        assert!(matches!(result, Err(ConvertError::DuplicateCategory(name)) if name == "Tops"));
    }
}
