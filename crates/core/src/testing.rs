//! In-memory object store for engine tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::traits::{CompletedPart, ObjectInfo, ObjectStore};

/// Calls observed by [`MemoryStore`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Head,
    GetRange(u64, u64),
    Put(usize),
    Create,
    UploadPart(i32, usize),
    Complete(Vec<i32>),
    Abort,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Vec<u8>>,
    uploads: HashMap<String, BTreeMap<i32, Vec<u8>>>,
    next_upload: u32,
    calls: Vec<Call>,
    /// part number → failures still to inject
    part_failures: HashMap<i32, u32>,
    declared_size: Option<u64>,
    truncate_ranges: bool,
}

/// Object store keeping objects and multipart uploads in memory
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn object_key(path: &RemotePath) -> String {
    format!("{}/{}", path.bucket, path.key)
}

fn etag_for(data: &[u8]) -> String {
    let sum = data
        .iter()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(*b)));
    format!("{sum:016x}-{}", data.len())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &RemotePath, data: Vec<u8>) {
        self.inner
            .lock()
            .unwrap()
            .objects
            .insert(object_key(path), data);
    }

    pub fn object(&self, path: &RemotePath) -> Option<Vec<u8>> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .get(&object_key(path))
            .cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn pending_uploads(&self) -> usize {
        self.inner.lock().unwrap().uploads.len()
    }

    /// Fail the next `times` attempts to upload `part_number`
    pub fn fail_part(&self, part_number: i32, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .part_failures
            .insert(part_number, times);
    }

    /// Report this size from `head_object` regardless of content
    pub fn declare_size(&self, size: u64) {
        self.inner.lock().unwrap().declared_size = Some(size);
    }

    /// Return one byte less than requested from every range read
    pub fn truncate_ranges(&self) {
        self.inner.lock().unwrap().truncate_ranges = true;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, path: &RemotePath) -> Result<ObjectInfo> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Head);
        if let Some(size) = inner.declared_size {
            return Ok(ObjectInfo::file(&path.key, size));
        }
        let data = inner
            .objects
            .get(&object_key(path))
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        Ok(ObjectInfo::file(&path.key, data.len() as u64))
    }

    async fn get_range(&self, path: &RemotePath, start: u64, end: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::GetRange(start, end));
        let data = inner
            .objects
            .get(&object_key(path))
            .ok_or_else(|| Error::NotFound(path.to_string()))?;
        let start = start as usize;
        let end = (end as usize + 1).min(data.len());
        let mut slice = data.get(start..end).unwrap_or_default().to_vec();
        if inner.truncate_ranges {
            slice.pop();
        }
        Ok(slice)
    }

    async fn put_object(&self, path: &RemotePath, data: &[u8]) -> Result<ObjectInfo> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Put(data.len()));
        inner.objects.insert(object_key(path), data.to_vec());
        let mut info = ObjectInfo::file(&path.key, data.len() as u64);
        info.etag = Some(etag_for(data));
        Ok(info)
    }

    async fn create_multipart_upload(&self, _path: &RemotePath) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Create);
        inner.next_upload += 1;
        let upload_id = format!("upload-{}", inner.next_upload);
        inner.uploads.insert(upload_id.clone(), BTreeMap::new());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _path: &RemotePath,
        upload_id: &str,
        part_number: i32,
        data: &[u8],
    ) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::UploadPart(part_number, data.len()));

        if let Some(left) = inner.part_failures.get_mut(&part_number) {
            if *left > 0 {
                *left -= 1;
                return Err(Error::RemoteQuery(format!(
                    "injected failure for part {part_number}"
                )));
            }
        }

        let parts = inner
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| Error::NotFound(format!("upload {upload_id}")))?;
        parts.insert(part_number, data.to_vec());
        Ok(etag_for(data))
    }

    async fn complete_multipart_upload(
        &self,
        path: &RemotePath,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<ObjectInfo> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(Call::Complete(parts.iter().map(|p| p.part_number).collect()));

        let uploaded = inner
            .uploads
            .remove(upload_id)
            .ok_or_else(|| Error::NotFound(format!("upload {upload_id}")))?;

        let mut object = Vec::new();
        for part in parts {
            let data = uploaded
                .get(&part.part_number)
                .ok_or_else(|| Error::RemoteQuery(format!("missing part {}", part.part_number)))?;
            if etag_for(data) != part.etag {
                return Err(Error::RemoteQuery(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            object.extend_from_slice(data);
        }

        let size = object.len() as u64;
        inner.objects.insert(object_key(path), object);
        Ok(ObjectInfo::file(&path.key, size))
    }

    async fn abort_multipart_upload(&self, _path: &RemotePath, upload_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Abort);
        inner.uploads.remove(upload_id);
        Ok(())
    }
}
