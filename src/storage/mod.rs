//! # Almacén de Registros
//! src/storage/mod.rs
//!
//! El núcleo solo necesita "buscar registro por clave". La persistencia real
//! queda fuera; aquí hay un almacén en memoria y uno que carga un JSON al
//! arrancar:
//!
//! ```json
//! {
//!   "ana": { "key": "ana", "password_sha256": "5e88..." }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// Registro de credenciales
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,

    /// SHA-256 del password en hexadecimal minúsculo
    pub password_sha256: String,
}

/// Capacidad de búsqueda que consume el servidor
pub trait RecordStore: Send + Sync {
    /// Busca un registro por clave
    fn lookup(&self, key: &str) -> Option<Record>;
}

/// Almacén en memoria
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: HashMap<String, Record>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.key.clone(), record);
    }
}

impl RecordStore for MemoryRecordStore {
    fn lookup(&self, key: &str) -> Option<Record> {
        self.records.get(key).cloned()
    }
}

/// Almacén cargado una sola vez desde un archivo JSON
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    inner: MemoryRecordStore,
}

impl JsonRecordStore {
    /// Carga el archivo. Un JSON corrupto devuelve `InvalidData`.
    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let records: HashMap<String, Record> = serde_json::from_reader(reader)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut inner = MemoryRecordStore::new();
        for (key, mut record) in records {
            record.key = key;
            inner.insert(record);
        }
        Ok(Self { inner })
    }
}

impl RecordStore for JsonRecordStore {
    fn lookup(&self, key: &str) -> Option<Record> {
        self.inner.lookup(key)
    }
}
