//! Design-system catalog
//!
//! Read-only component and design-token metadata served by the MCP tools and
//! resources. Loaded once at startup, either from a JSON file or from the
//! catalog bundled with the binary.

mod models;
mod search;

pub use models::{CategoryCount, ComponentMetadata, ComponentSummary, DesignToken, PropSpec};
pub use search::SearchHit;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

const BUILTIN_CATALOG: &str = include_str!("../../data/catalog.json");

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    components: Vec<ComponentMetadata>,
    #[serde(default)]
    tokens: Vec<DesignToken>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    components: Vec<ComponentMetadata>,
    /// Lowercased name to index into `components`.
    by_name: HashMap<String, usize>,
    tokens: Vec<DesignToken>,
}

impl Catalog {
    pub fn new(components: Vec<ComponentMetadata>, tokens: Vec<DesignToken>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(components.len());
        for (idx, component) in components.iter().enumerate() {
            if component.name.trim().is_empty() {
                bail!("Component at position {} has an empty name", idx);
            }
            if by_name.insert(component.name.to_lowercase(), idx).is_some() {
                bail!("Duplicate component name: {}", component.name);
            }
        }
        Ok(Self {
            components,
            by_name,
            tokens,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: CatalogDocument =
            serde_json::from_str(json).context("Failed to parse catalog JSON")?;
        Self::new(doc.components, doc.tokens)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file {:?}", path))?;
        let catalog = Self::from_json_str(&json)
            .with_context(|| format!("Invalid catalog file {:?}", path))?;
        info!(
            "Loaded catalog from {:?}: {} components, {} tokens",
            path,
            catalog.component_count(),
            catalog.token_count()
        );
        Ok(catalog)
    }

    pub fn builtin() -> Result<Self> {
        Self::from_json_str(BUILTIN_CATALOG).context("Built-in catalog is invalid")
    }

    /// Loads `path` when given, the built-in catalog otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => {
                let catalog = Self::builtin()?;
                info!(
                    "Using built-in catalog: {} components, {} tokens",
                    catalog.component_count(),
                    catalog.token_count()
                );
                Ok(catalog)
            }
        }
    }

    pub fn components(&self) -> &[ComponentMetadata] {
        &self.components
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Case-insensitive lookup by name.
    pub fn component(&self, name: &str) -> Option<&ComponentMetadata> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&idx| &self.components[idx])
    }

    pub fn components_in_category<'a>(
        &'a self,
        category: &'a str,
    ) -> impl Iterator<Item = &'a ComponentMetadata> + 'a {
        self.components
            .iter()
            .filter(move |c| c.category.eq_ignore_ascii_case(category))
    }

    pub fn summaries(&self, category: Option<&str>) -> Vec<ComponentSummary> {
        match category {
            Some(category) => self
                .components_in_category(category)
                .map(ComponentSummary::from)
                .collect(),
            None => self.components.iter().map(ComponentSummary::from).collect(),
        }
    }

    /// Categories in alphabetical order with their component counts.
    pub fn categories(&self) -> Vec<CategoryCount> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for component in &self.components {
            *counts.entry(component.category.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(name, count)| CategoryCount {
                name: name.to_string(),
                count,
            })
            .collect()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        search::rank(self.components.iter(), query, limit)
    }

    pub fn tokens(&self, category: Option<&str>) -> Vec<&DesignToken> {
        self.tokens
            .iter()
            .filter(|t| category.map_or(true, |c| t.category.eq_ignore_ascii_case(c)))
            .collect()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn token_categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.tokens.iter().map(|t| t.category.clone()).collect();
        categories.sort();
        categories.dedup();
        categories
    }
}
