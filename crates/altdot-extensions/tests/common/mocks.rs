//! Recording mocks for the registry and host hook seams
//!
//! Every invocation is recorded behind a mutex so tests can assert on call
//! counts and arguments without network or host side effects.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use altdot_core::{Error, Result};
use altdot_extensions::{HostHooks, RegistryClient, UpdateHit, UpdateQuery};
use async_trait::async_trait;

fn mock_url(extension_id: &str) -> String {
    format!("mock://{extension_id}")
}

fn id_from_url(url: &str) -> &str {
    url.strip_prefix("mock://").unwrap_or(url)
}

/// In-memory registry with staged archives and scripted update hits
pub struct MockRegistry {
    archives: Mutex<HashMap<String, Vec<u8>>>,
    hits: Mutex<Vec<UpdateHit>>,
    failing_downloads: Mutex<HashSet<String>>,
    download_log: Mutex<Vec<String>>,
    check_update_log: Mutex<Vec<Vec<UpdateQuery>>>,
    download_delay: Mutex<Option<Duration>>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            archives: Mutex::new(HashMap::new()),
            hits: Mutex::new(Vec::new()),
            failing_downloads: Mutex::new(HashSet::new()),
            download_log: Mutex::new(Vec::new()),
            check_update_log: Mutex::new(Vec::new()),
            download_delay: Mutex::new(None),
        }
    }

    /// Make an archive downloadable for the given extension id
    pub fn stage_archive(&self, extension_id: &str, bytes: Vec<u8>) {
        self.archives
            .lock()
            .unwrap()
            .insert(extension_id.to_string(), bytes);
    }

    /// Script the next update check to flag this extension
    pub fn flag_update(&self, extension_id: &str) {
        self.hits.lock().unwrap().push(UpdateHit {
            id: extension_id.to_string(),
            file_url: mock_url(extension_id),
        });
    }

    /// Make downloads for this extension fail with a network error
    pub fn fail_download(&self, extension_id: &str) {
        self.failing_downloads
            .lock()
            .unwrap()
            .insert(extension_id.to_string());
    }

    pub fn clear_download_failures(&self) {
        self.failing_downloads.lock().unwrap().clear();
    }

    /// Delay every download; lets tests hold an install in flight
    pub fn set_download_delay(&self, delay: Duration) {
        *self.download_delay.lock().unwrap() = Some(delay);
    }

    pub fn download_count(&self) -> usize {
        self.download_log.lock().unwrap().len()
    }

    pub fn check_update_count(&self) -> usize {
        self.check_update_log.lock().unwrap().len()
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn get_download_file_url(&self, extension_id: &str) -> Result<String> {
        Ok(mock_url(extension_id))
    }

    async fn check_update(&self, installed: &[UpdateQuery]) -> Result<Vec<UpdateHit>> {
        self.check_update_log
            .lock()
            .unwrap()
            .push(installed.to_vec());

        let queried: HashSet<&str> = installed.iter().map(|query| query.id.as_str()).collect();
        let hits = self
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| queried.contains(hit.id.as_str()))
            .cloned()
            .collect();
        Ok(hits)
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>> {
        self.download_log.lock().unwrap().push(url.to_string());

        let delay = *self.download_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let extension_id = id_from_url(url);
        if self
            .failing_downloads
            .lock()
            .unwrap()
            .contains(extension_id)
        {
            return Err(Error::network(format!(
                "simulated download failure for {extension_id}"
            )));
        }

        self.archives
            .lock()
            .unwrap()
            .get(extension_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("archive for {extension_id}")))
    }
}

/// Host hooks that record their invocations
#[derive(Default)]
pub struct RecordingHooks {
    unregistered: Mutex<Vec<(String, Vec<String>)>>,
    deleted: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unregistered_shortcuts(&self) -> Vec<(String, Vec<String>)> {
        self.unregistered.lock().unwrap().clone()
    }

    pub fn deleted_private_data(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostHooks for RecordingHooks {
    async fn unregister_shortcuts(&self, extension_id: &str, command_ids: &[String]) -> Result<()> {
        self.unregistered
            .lock()
            .unwrap()
            .push((extension_id.to_string(), command_ids.to_vec()));
        Ok(())
    }

    async fn delete_private_data(&self, extension_id: &str) -> Result<()> {
        self.deleted.lock().unwrap().push(extension_id.to_string());
        Ok(())
    }
}
