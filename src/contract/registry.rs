//! Schema registry: versioned contracts with optional on-disk persistence
//!
//! - Contracts stored at `<dir>/contract_<version>.json`, one file per version
//! - Registration of a different contract under a taken version is refused
//! - Re-registering an identical contract is a no-op
//! - Readers share the registry; writes take a coarse write lock

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use super::errors::{ContractError, ContractResult};
use super::types::Contract;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    /// Directory holding published contract files, if persistent
    dir: Option<PathBuf>,
    contracts: RwLock<HashMap<String, Arc<Contract>>>,
}

impl SchemaRegistry {
    /// Creates an in-memory registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a registry backed by a directory, loading every contract file
    /// found there. The directory is created if missing.
    pub fn open(dir: impl AsRef<Path>) -> ContractResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let registry = Self {
            dir: Some(dir.clone()),
            contracts: RwLock::new(HashMap::new()),
        };

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                ContractError::storage(dir.display().to_string(), format!("create failed: {}", e))
            })?;
            return Ok(registry);
        }

        let entries = fs::read_dir(&dir).map_err(|e| {
            ContractError::storage(dir.display().to_string(), format!("read_dir failed: {}", e))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| ContractError::storage(dir.display().to_string(), e.to_string()))?
                .path();
            let is_contract_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with("contract_") && n.ends_with(".json"));
            if !is_contract_file {
                continue;
            }
            let contract = load_contract_file(&path)?;
            registry.register(contract)?;
        }

        Ok(registry)
    }

    /// Looks up a contract by version. No implicit upgrade.
    pub fn get(&self, schema_version: &str) -> ContractResult<Arc<Contract>> {
        self.contracts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema_version)
            .cloned()
            .ok_or_else(|| ContractError::SchemaNotFound(schema_version.to_string()))
    }

    /// Registers a contract in memory.
    pub fn register(&self, contract: Contract) -> ContractResult<()> {
        contract
            .validate_structure()
            .map_err(|reason| ContractError::InvalidContract {
                version: contract.schema_version.clone(),
                reason,
            })?;

        let mut contracts = self.contracts.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = contracts.get(&contract.schema_version) {
            if **existing == contract {
                return Ok(());
            }
            return Err(ContractError::DuplicateVersion(contract.schema_version));
        }
        contracts.insert(contract.schema_version.clone(), Arc::new(contract));
        Ok(())
    }

    /// Registers a contract and writes it to the registry directory.
    ///
    /// Publishing an identical contract again is a no-op; an existing file
    /// is never overwritten.
    pub fn publish(&self, contract: Contract) -> ContractResult<PathBuf> {
        let dir = self.dir.as_ref().ok_or_else(|| {
            ContractError::storage("<in-memory>", "registry has no backing directory")
        })?;
        let path = dir.join(format!("contract_{}.json", contract.schema_version));

        self.register(contract.clone())?;

        if path.exists() {
            return Ok(path);
        }

        let content = serde_json::to_string_pretty(&contract).map_err(|e| {
            ContractError::storage(path.display().to_string(), format!("serialize failed: {}", e))
        })?;
        fs::write(&path, content).map_err(|e| {
            ContractError::storage(path.display().to_string(), format!("write failed: {}", e))
        })?;

        Ok(path)
    }

    /// Published versions, sorted.
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self
            .contracts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        versions.sort();
        versions
    }

    pub fn len(&self) -> usize {
        self.contracts.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads and parses one contract file.
pub fn load_contract_file(path: &Path) -> ContractResult<Contract> {
    let content = fs::read_to_string(path).map_err(|e| {
        ContractError::storage(path.display().to_string(), format!("read failed: {}", e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ContractError::storage(path.display().to_string(), format!("invalid JSON: {}", e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::FieldSpec;
    use tempfile::TempDir;

    fn sample_contract() -> Contract {
        Contract::new(
            "v1",
            vec![FieldSpec::int("user_id"), FieldSpec::float("amount").with_range(0.0, 100_000.0)],
        )
    }

    #[test]
    fn test_register_and_get() {
        let registry = SchemaRegistry::new();
        registry.register(sample_contract()).unwrap();

        let contract = registry.get("v1").unwrap();
        assert_eq!(contract.schema_version, "v1");
        assert_eq!(contract.fields.len(), 2);
    }

    #[test]
    fn test_unknown_version() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.get("v404").unwrap_err(),
            ContractError::SchemaNotFound("v404".into())
        );
    }

    #[test]
    fn test_identical_registration_is_noop() {
        let registry = SchemaRegistry::new();
        registry.register(sample_contract()).unwrap();
        registry.register(sample_contract()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicting_registration_rejected() {
        let registry = SchemaRegistry::new();
        registry.register(sample_contract()).unwrap();

        let changed = Contract::new("v1", vec![FieldSpec::int("user_id")]);
        let err = registry.register(changed).unwrap_err();
        assert_eq!(err.code(), "FG_DUPLICATE_VERSION");
        // Original survives
        assert_eq!(registry.get("v1").unwrap().fields.len(), 2);
    }

    #[test]
    fn test_invalid_contract_rejected() {
        let registry = SchemaRegistry::new();
        let bad = Contract::new("v1", vec![FieldSpec::int("a"), FieldSpec::int("a")]);
        assert_eq!(registry.register(bad).unwrap_err().code(), "FG_INVALID_CONTRACT");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_publish_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let registry = SchemaRegistry::open(tmp.path()).unwrap();
        let path = registry.publish(sample_contract()).unwrap();
        assert!(path.ends_with("contract_v1.json"));

        let reopened = SchemaRegistry::open(tmp.path()).unwrap();
        assert_eq!(*reopened.get("v1").unwrap(), sample_contract());
        assert_eq!(reopened.versions(), vec!["v1".to_string()]);
    }

    #[test]
    fn test_publish_without_directory_fails() {
        let registry = SchemaRegistry::new();
        assert_eq!(
            registry.publish(sample_contract()).unwrap_err().code(),
            "FG_CONTRACT_STORAGE"
        );
    }

    #[test]
    fn test_open_ignores_unrelated_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("notes.txt"), "hello").unwrap();
        let registry = SchemaRegistry::open(tmp.path()).unwrap();
        assert!(registry.is_empty());
    }
}
