//! Filesystem provider registry.

use crate::provider::FileSystemProvider;
use crate::{VfsError, VfsErrorKind, VfsResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

fn normalize_provider_name(input: &str) -> VfsResult<String> {
    let trimmed = input.trim_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return Err(VfsError::new(
            VfsErrorKind::InvalidInput,
            "provider_registry.name.empty",
        ));
    }

    let mut normalized = String::with_capacity(trimmed.len());
    for byte in trimmed.as_bytes() {
        let lower = byte.to_ascii_lowercase();
        let allowed = matches!(lower, b'a'..=b'z' | b'0'..=b'9' | b'.' | b'_' | b'-');
        if !allowed {
            return Err(VfsError::new(
                VfsErrorKind::InvalidInput,
                "provider_registry.name.invalid_char",
            ));
        }
        normalized.push(lower as char);
    }

    Ok(normalized)
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn FileSystemProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its protocol name.
    pub fn register(&self, provider: Arc<dyn FileSystemProvider>) -> VfsResult<()> {
        let name = normalize_provider_name(provider.protocol())?;
        let mut providers = self.providers.write();
        if providers.contains_key(&name) {
            return Err(VfsError::new(
                VfsErrorKind::AlreadyExists,
                "provider_registry.register",
            ));
        }
        tracing::debug!(protocol = %name, "registered filesystem provider");
        providers.insert(name, provider);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> VfsResult<Option<Arc<dyn FileSystemProvider>>> {
        let name = normalize_provider_name(name)?;
        let removed = self.providers.write().remove(&name);
        if removed.is_some() {
            tracing::debug!(protocol = %name, "unregistered filesystem provider");
        }
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> VfsResult<Option<Arc<dyn FileSystemProvider>>> {
        let name = normalize_provider_name(name)?;
        Ok(self.providers.read().get(&name).cloned())
    }

    /// Whether `provider` is the instance currently registered for its protocol.
    pub fn is_registered(&self, provider: &dyn FileSystemProvider) -> bool {
        let Ok(name) = normalize_provider_name(provider.protocol()) else {
            return false;
        };
        self.providers
            .read()
            .get(&name)
            .is_some_and(|p| crate::provider::same_provider(p.as_ref(), provider))
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// The provider claiming `path`: among providers whose root is found
    /// literally at the start of `path`, the highest rank wins, ties broken
    /// by name.
    pub fn claiming_provider(&self, path: &str) -> Option<Arc<dyn FileSystemProvider>> {
        let providers: Vec<(String, Arc<dyn FileSystemProvider>)> = self
            .providers
            .read()
            .iter()
            .map(|(name, provider)| (name.clone(), provider.clone()))
            .collect();

        providers
            .into_iter()
            .filter(|(_, provider)| {
                let Some(normalized) = provider.normalize(path) else {
                    return false;
                };
                let root = provider.extract_root_path(&normalized);
                !root.is_empty() && path_claims_root(path, &root)
            })
            .max_by(|(a_name, a), (b_name, b)| {
                a.rank().cmp(&b.rank()).then_with(|| b_name.cmp(a_name))
            })
            .map(|(_, provider)| provider)
    }
}

fn path_claims_root(path: &str, root: &str) -> bool {
    let path = crate::path::normalize_separators(path);
    let root_trimmed = root.strip_suffix('/').unwrap_or(root);
    path.starts_with(root) || path == root_trimmed || root == "/"
}
