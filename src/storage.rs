use crate::matcher;
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use std::{fmt, path::PathBuf, sync::Arc};
use tokio::fs;
use tokio::sync::RwLock;

const FILE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub caption: String,
    pub message_id: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct FileState {
    version: u32,
    // порядок вставки сохраняется
    entries: Vec<CatalogEntry>,
}

/// На диске: либо текущий формат, либо плоский словарь `{"caption": id}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnDisk {
    State(FileState),
    Flat(FlatMap),
}

/// `{"caption": id, ...}` в том порядке, в каком ключи идут в файле.
struct FlatMap(Vec<(String, i32)>);

impl<'de> Deserialize<'de> for FlatMap {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct FlatVisitor;

        impl<'de> Visitor<'de> for FlatVisitor {
            type Value = FlatMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of caption to message id")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FlatMap, A::Error> {
                let mut out = Vec::new();
                while let Some((caption, message_id)) = map.next_entry::<String, i32>()? {
                    out.push((caption, message_id));
                }
                Ok(FlatMap(out))
            }
        }

        d.deserialize_map(FlatVisitor)
    }
}

impl From<OnDisk> for FileState {
    fn from(d: OnDisk) -> Self {
        match d {
            OnDisk::State(mut s) => {
                if s.version == 0 { s.version = FILE_VERSION; }
                s
            }
            OnDisk::Flat(FlatMap(pairs)) => {
                let mut s = FileState { version: FILE_VERSION, entries: Vec::new() };
                for (caption, message_id) in pairs {
                    upsert_entry(&mut s.entries, normalize_caption(&caption), message_id);
                }
                s
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated { previous: i32 },
    Unchanged,
    /// подпись пустая после нормализации
    Ignored,
}

#[derive(Clone)]
pub struct Storage {
    inner: Arc<RwLock<FileState>>,
    path: PathBuf,
}

pub fn normalize_caption(caption: &str) -> String {
    caption.trim().to_lowercase()
}

impl Storage {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = if fs::try_exists(&path).await? {
            let data = fs::read(&path).await?;
            match serde_json::from_slice::<OnDisk>(&data) {
                Ok(d) => FileState::from(d),
                Err(e) => {
                    // убираем в сторону, иначе первый же upsert перезапишет файл
                    let aside = corrupt_path(&path);
                    fs::rename(&path, &aside).await?;
                    tracing::warn!(
                        path = %path.display(),
                        moved_to = %aside.display(),
                        error = %e,
                        "catalog file is not valid JSON, starting empty"
                    );
                    FileState { version: FILE_VERSION, ..Default::default() }
                }
            }
        } else {
            FileState { version: FILE_VERSION, ..Default::default() }
        };
        Ok(Self { inner: Arc::new(RwLock::new(state)), path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Записать подпись → id (последняя запись побеждает) и сразу сбросить на диск.
    /// Если запись не удалась, изменение в памяти откатывается.
    pub async fn upsert(&self, caption: &str, message_id: i32) -> Result<Upsert, StoreError> {
        let caption = normalize_caption(caption);
        if caption.is_empty() {
            return Ok(Upsert::Ignored);
        }

        // write-лок держим и на время записи файла: мутации идут строго по одной
        let mut guard = self.inner.write().await;
        let outcome = upsert_entry(&mut guard.entries, caption.clone(), message_id);
        match outcome {
            Upsert::Unchanged | Upsert::Ignored => return Ok(outcome),
            Upsert::Inserted | Upsert::Updated { .. } => {}
        }

        if let Err(e) = self.flush(&guard).await {
            match outcome {
                Upsert::Inserted => guard.entries.retain(|x| x.caption != caption),
                Upsert::Updated { previous } => {
                    if let Some(x) = guard.entries.iter_mut().find(|x| x.caption == caption) {
                        x.message_id = previous;
                    }
                }
                Upsert::Unchanged | Upsert::Ignored => {}
            }
            return Err(e);
        }
        Ok(outcome)
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Полный снапшот; с `keyword` — только подписи, содержащие его.
    pub async fn all(&self, keyword: Option<&str>) -> Vec<CatalogEntry> {
        let guard = self.inner.read().await;
        match keyword {
            Some(k) => guard.entries.iter().filter(|e| matcher::contains(&e.caption, k)).cloned().collect(),
            None => guard.entries.clone(),
        }
    }

    pub async fn find_substring(&self, query: &str) -> Vec<CatalogEntry> {
        self.all(Some(query)).await
    }

    async fn flush(&self, state: &FileState) -> Result<(), StoreError> {
        let snapshot = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &snapshot).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn corrupt_path(path: &std::path::Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn upsert_entry(entries: &mut Vec<CatalogEntry>, caption: String, message_id: i32) -> Upsert {
    if caption.is_empty() {
        return Upsert::Ignored;
    }
    match entries.iter_mut().find(|x| x.caption == caption) {
        Some(x) if x.message_id == message_id => Upsert::Unchanged,
        Some(x) => {
            let previous = x.message_id;
            x.message_id = message_id;
            Upsert::Updated { previous }
        }
        None => {
            entries.push(CatalogEntry { caption, message_id });
            Upsert::Inserted
        }
    }
}
