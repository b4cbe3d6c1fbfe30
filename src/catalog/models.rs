use serde::{Deserialize, Serialize};

/// One property accepted by a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentMetadata {
    pub name: String,
    pub description: String,
    pub category: String,
    /// Import path within the design-system package.
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub props: Vec<PropSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Short form used in listings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComponentSummary {
    pub name: String,
    pub category: String,
    pub description: String,
}

impl From<&ComponentMetadata> for ComponentSummary {
    fn from(c: &ComponentMetadata) -> Self {
        Self {
            name: c.name.clone(),
            category: c.category.clone(),
            description: c.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesignToken {
    pub name: String,
    pub category: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}
