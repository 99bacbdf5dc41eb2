use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tokio::{io::AsyncWriteExt, sync::Mutex};
use tracing::warn;

use climate_common::{DecisionRecord, RuntimeConfig};

#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    decisions_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            decisions_path: Arc::new(data_dir.join("decisions.jsonl")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Appends one JSON line; the log is never rewritten.
    pub async fn append_record(&self, record: &DecisionRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let path = self.decisions_path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }

    /// Most recent records first, by record timestamp. Concurrent requests may
    /// append slightly out of processing order, so file order is not trusted.
    pub async fn recent_records(&self, limit: usize) -> anyhow::Result<Vec<DecisionRecord>> {
        let raw = {
            let _guard = self.lock.lock().await;
            match tokio::fs::read_to_string(self.decisions_path.as_ref()).await {
                Ok(raw) => raw,
                Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                Err(err) => return Err(err.into()),
            }
        };

        let mut records = Vec::new();
        for line in raw.lines().rev().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<DecisionRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping malformed decision log line: {err}"),
            }
        }
        // Stable sort keeps later lines first among equal timestamps.
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "climate-store-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn record(seconds: i64, temperature: f64) -> DecisionRecord {
        DecisionRecord {
            timestamp: Utc.timestamp_opt(1_767_225_600 + seconds, 0).unwrap(),
            temperature,
            humidity: 60.0,
            prediction_30: temperature + 0.5,
            prediction_60: temperature + 1.0,
            decision: "IDLE:STABLE".to_string(),
            human_notes: "Conditions are steady. The system is standing by.".to_string(),
        }
    }

    #[tokio::test]
    async fn missing_files_yield_defaults() {
        let store = AppStore::at(scratch_dir("defaults"));

        let runtime = store.load_runtime_config().await.unwrap();
        let history = store.recent_records(10).await.unwrap();

        assert_eq!(runtime.engine.window_capacity, 10);
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let store = AppStore::at(scratch_dir("history"));
        for (i, temp) in [24.0, 24.5, 25.0].into_iter().enumerate() {
            store.append_record(&record(i as i64, temp)).await.unwrap();
        }

        let history = store.recent_records(2).await.unwrap();

        assert_eq!(history, vec![record(2, 25.0), record(1, 24.5)]);
    }

    #[tokio::test]
    async fn history_orders_by_timestamp_not_append_order() {
        let store = AppStore::at(scratch_dir("out-of-order"));
        store.append_record(&record(0, 24.0)).await.unwrap();
        store.append_record(&record(2, 25.0)).await.unwrap();
        // Processed before the previous line but written after it.
        store.append_record(&record(1, 24.5)).await.unwrap();

        let history = store.recent_records(2).await.unwrap();

        assert_eq!(history, vec![record(2, 25.0), record(1, 24.5)]);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = scratch_dir("malformed");
        let store = AppStore::at(dir.clone());
        store.append_record(&record(0, 24.0)).await.unwrap();
        let mut raw = std::fs::read_to_string(dir.join("decisions.jsonl")).unwrap();
        raw.push_str("{not json\n");
        std::fs::write(dir.join("decisions.jsonl"), raw).unwrap();

        let history = store.recent_records(5).await.unwrap();

        assert_eq!(history, vec![record(0, 24.0)]);
    }
}
