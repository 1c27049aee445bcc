use crate::configuration::{Environment, ModelSettings};
use crate::models::ModelRow;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Google,
    LmStudio,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [ProviderKind::OpenAi, ProviderKind::Google, ProviderKind::LmStudio];

    /// Prefix used in model slugs and in `/api/chat/{provider}`.
    pub fn prefix(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Google => "google",
            ProviderKind::LmStudio => "lmstudio",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::Google => "Google",
            ProviderKind::LmStudio => "LM Studio",
        }
    }

    /// Local model servers are never exposed outside development.
    pub fn is_development_only(&self) -> bool {
        matches!(self, ProviderKind::LmStudio)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: i32,
    pub slug: String,
    pub display_name: String,
    pub provider: ProviderKind,
}

impl ModelDescriptor {
    /// The provider-side model name, i.e. the slug without its prefix.
    pub fn model_name(&self) -> &str {
        model_name_from_slug(&self.slug)
    }
}

/// `openai:gpt-4o` -> `gpt-4o`; an empty slug renders as `AI`.
pub fn model_name_from_slug(slug: &str) -> &str {
    if slug.is_empty() {
        return "AI";
    }
    match slug.split_once(':') {
        Some((_, name)) if !name.is_empty() => name,
        _ => slug,
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unsupported model provider for ID: {0}")]
    NotFound(String),
    #[error("invalid model catalogue: {0}")]
    InvalidCatalogue(String),
}

/// Immutable slug -> model lookup built once from configuration.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn from_settings(entries: &[ModelSettings]) -> Result<Self, RegistryError> {
        let mut ids = HashSet::new();
        let mut slugs = HashSet::new();
        let mut models = Vec::with_capacity(entries.len());

        for entry in entries {
            let (prefix, name) = entry
                .slug
                .split_once(':')
                .ok_or_else(|| RegistryError::InvalidCatalogue(format!("slug {} has no provider prefix", entry.slug)))?;
            if name.is_empty() {
                return Err(RegistryError::InvalidCatalogue(format!("slug {} has no model name", entry.slug)));
            }
            let provider = ProviderKind::from_prefix(prefix)
                .ok_or_else(|| RegistryError::InvalidCatalogue(format!("unknown provider {prefix}")))?;
            if !ids.insert(entry.id) || !slugs.insert(entry.slug.clone()) {
                return Err(RegistryError::InvalidCatalogue(format!("duplicate model {}", entry.slug)));
            }

            models.push(ModelDescriptor {
                id: entry.id,
                slug: entry.slug.clone(),
                display_name: entry.display_name.clone(),
                provider,
            });
        }

        Ok(Self { models })
    }

    pub fn resolve(&self, slug: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.models
            .iter()
            .find(|m| m.slug == slug)
            .ok_or_else(|| RegistryError::NotFound(slug.to_string()))
    }

    /// Catalogue visible in `environment`; development-only providers are
    /// hidden elsewhere.
    pub fn list_available(&self, environment: Environment) -> Vec<&ModelDescriptor> {
        self.models
            .iter()
            .filter(|m| environment.is_development() || !m.provider.is_development_only())
            .collect()
    }

    pub fn rows(&self) -> Vec<ModelRow> {
        self.models
            .iter()
            .map(|m| ModelRow {
                id: m.id,
                slug: m.slug.clone(),
                display_name: m.display_name.clone(),
                provider: m.provider.prefix().to_string(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i32, slug: &str) -> ModelSettings {
        ModelSettings {
            id,
            slug: slug.to_string(),
            display_name: slug.to_uppercase(),
        }
    }

    fn registry() -> ModelRegistry {
        ModelRegistry::from_settings(&[
            entry(1, "openai:gpt-4o-mini"),
            entry(2, "google:gemini-pro"),
            entry(3, "lmstudio:deepseek-coder"),
        ])
        .unwrap()
    }

    #[test]
    fn resolve_returns_adapter_kind_and_numeric_id() {
        let registry = registry();
        let model = registry.resolve("google:gemini-pro").unwrap();
        assert_eq!(model.provider, ProviderKind::Google);
        assert_eq!(model.id, 2);
        assert_eq!(model.model_name(), "gemini-pro");
    }

    #[test]
    fn unknown_slug_is_not_found() {
        let err = registry().resolve("unknown:foo").unwrap_err();
        assert_eq!(err, RegistryError::NotFound("unknown:foo".into()));
        assert_eq!(err.to_string(), "Unsupported model provider for ID: unknown:foo");
    }

    #[test]
    fn development_only_models_are_hidden_in_production() {
        let registry = registry();
        assert_eq!(registry.list_available(Environment::Development).len(), 3);

        let prod: Vec<&str> = registry
            .list_available(Environment::Production)
            .iter()
            .map(|m| m.slug.as_str())
            .collect();
        assert_eq!(prod, vec!["openai:gpt-4o-mini", "google:gemini-pro"]);
    }

    #[test]
    fn catalogue_rejects_unknown_prefix_and_duplicates() {
        assert!(ModelRegistry::from_settings(&[entry(1, "anthropic:claude")]).is_err());
        assert!(ModelRegistry::from_settings(&[entry(1, "gpt-4o")]).is_err());
        assert!(ModelRegistry::from_settings(&[entry(1, "openai:a"), entry(1, "openai:b")]).is_err());
    }

    #[test]
    fn slug_display_helper() {
        assert_eq!(model_name_from_slug("openai:gpt-4o"), "gpt-4o");
        assert_eq!(model_name_from_slug(""), "AI");
        assert_eq!(model_name_from_slug("plain"), "plain");
    }
}
