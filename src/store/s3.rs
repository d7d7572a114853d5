use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::time::Duration;

use rusty_s3::actions::{CreateMultipartUpload, ListObjectsV2, S3Action};
use rusty_s3::{Bucket, Credentials, UrlStyle};
use tracing::{debug, warn};

use super::{ObjectInfo, ObjectStore, Progress, ProgressReader};
use crate::config::{Backend, StoreConfig};
use crate::error::{Error, Result};

/// Duration for presigned URL validity.
const PRESIGN_DURATION: Duration = Duration::from_secs(3600);

/// S3-compatible store, one bucket, presigned requests over a blocking agent.
pub struct S3Store {
    bucket: Bucket,
    credentials: Credentials,
    agent: ureq::Agent,
    multipart_threshold: u64,
    multipart_chunk_size: u64,
}

impl S3Store {
    pub fn new(config: &StoreConfig, bucket_name: &str) -> Result<Self> {
        let Backend::S3 {
            endpoint,
            access_key,
            secret_key,
            region,
            verify_certificate,
        } = &config.backend
        else {
            return Err(Error::Validation("S3 store needs an http(s) endpoint".into()));
        };

        // Endpoint is always explicit; use path-style addressing.
        let bucket = Bucket::new(
            endpoint.clone(),
            UrlStyle::Path,
            bucket_name.to_string(),
            region.clone(),
        )
        .map_err(|e| Error::Validation(format!("invalid bucket '{bucket_name}': {e}")))?;

        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300));
        if !verify_certificate {
            warn!("TLS certificate verification is disabled");
            builder = builder.tls_config(crate::tls::insecure_client_config());
        }

        Ok(Self {
            bucket,
            credentials: Credentials::new(access_key.clone(), secret_key.clone()),
            agent: builder.build(),
            multipart_threshold: config.multipart_threshold,
            multipart_chunk_size: config.multipart_chunk_size,
        })
    }

    fn put_stream(&self, key: &str, reader: impl Read, len: u64) -> Result<()> {
        let url = self
            .bucket
            .put_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        self.agent
            .put(url.as_str())
            .set("Content-Length", &len.to_string())
            .send(reader)
            .map_err(|e| store_error(&format!("PUT {key}"), e))?;
        Ok(())
    }

    fn multipart_upload(&self, key: &str, path: &Path, progress: Progress<'_>) -> Result<u64> {
        let url = self
            .bucket
            .create_multipart_upload(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        let body = self
            .agent
            .post(url.as_str())
            .send_bytes(&[])
            .map_err(|e| store_error(&format!("CREATE MULTIPART {key}"), e))?
            .into_string()?;
        let created = CreateMultipartUpload::parse_response(body.as_str())
            .map_err(|e| Error::Store(format!("CREATE MULTIPART {key}: bad response: {e}")))?;
        let upload_id = created.upload_id().to_string();
        debug!(key, upload_id = %upload_id, "multipart upload started");

        match self.upload_parts(key, &upload_id, path, progress) {
            Ok((etags, sent)) => {
                let action = self.bucket.complete_multipart_upload(
                    Some(&self.credentials),
                    key,
                    &upload_id,
                    etags.iter().map(String::as_str),
                );
                let url = action.sign(PRESIGN_DURATION);
                self.agent
                    .post(url.as_str())
                    .send_string(&action.body())
                    .map_err(|e| store_error(&format!("COMPLETE MULTIPART {key}"), e))?;
                Ok(sent)
            }
            Err(e) => {
                let url = self
                    .bucket
                    .abort_multipart_upload(Some(&self.credentials), key, &upload_id)
                    .sign(PRESIGN_DURATION);
                if let Err(abort) = self.agent.delete(url.as_str()).call() {
                    warn!(key, error = %abort, "could not abort multipart upload");
                }
                Err(e)
            }
        }
    }

    fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        path: &Path,
        progress: Progress<'_>,
    ) -> Result<(Vec<String>, u64)> {
        let mut file = BufReader::new(File::open(path)?);
        let mut etags = Vec::new();
        let mut sent = 0u64;
        let mut part_number: u16 = 1;

        loop {
            let mut chunk = Vec::with_capacity(self.multipart_chunk_size as usize);
            (&mut file)
                .take(self.multipart_chunk_size)
                .read_to_end(&mut chunk)?;
            if chunk.is_empty() {
                break;
            }

            let url = self
                .bucket
                .upload_part(Some(&self.credentials), key, part_number, upload_id)
                .sign(PRESIGN_DURATION);
            let resp = self
                .agent
                .put(url.as_str())
                .set("Content-Length", &chunk.len().to_string())
                .send(ProgressReader::new(&chunk[..], progress))
                .map_err(|e| store_error(&format!("PUT {key} part {part_number}"), e))?;
            let etag = resp.header("ETag").ok_or_else(|| {
                Error::Store(format!("PUT {key} part {part_number}: response missing ETag"))
            })?;
            etags.push(etag.to_string());
            sent += chunk.len() as u64;

            part_number = part_number.checked_add(1).ok_or_else(|| {
                Error::Store(format!("{key}: too many parts, raise multipart_chunk_mb"))
            })?;
        }

        Ok((etags, sent))
    }
}

impl ObjectStore for S3Store {
    fn bucket_exists(&self) -> Result<bool> {
        let url = self
            .bucket
            .head_bucket(Some(&self.credentials))
            .sign(PRESIGN_DURATION);
        match self.agent.head(url.as_str()).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(store_error("HEAD bucket", e)),
        }
    }

    fn ensure_bucket(&self) -> Result<()> {
        if self.bucket_exists()? {
            return Ok(());
        }
        let url = self
            .bucket
            .create_bucket(&self.credentials)
            .sign(PRESIGN_DURATION);
        self.agent
            .put(url.as_str())
            .send_bytes(&[])
            .map_err(|e| store_error("CREATE bucket", e))?;
        Ok(())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        self.put_stream(key, data, data.len() as u64)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self
            .bucket
            .get_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        match self.agent.get(url.as_str()).call() {
            Ok(resp) => {
                let mut buf = Vec::new();
                resp.into_reader().read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(store_error(&format!("GET {key}"), e)),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            action.query_mut().insert("prefix", prefix);
            if let Some(ref token) = continuation_token {
                action.query_mut().insert("continuation-token", token);
            }
            let url = action.sign(PRESIGN_DURATION);

            let body = self
                .agent
                .get(url.as_str())
                .call()
                .map_err(|e| store_error(&format!("LIST {prefix}"), e))?
                .into_string()?;
            let parsed = ListObjectsV2::parse_response(body.as_str())
                .map_err(|e| Error::Store(format!("LIST {prefix}: bad response: {e}")))?;

            for obj in parsed.contents {
                // Skip directory markers
                if obj.key.ends_with('/') {
                    continue;
                }
                objects.push(ObjectInfo { key: obj.key, size: obj.size });
            }

            match parsed.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(objects)
    }

    fn upload_file(&self, key: &str, path: &Path, progress: Progress<'_>) -> Result<u64> {
        let len = std::fs::metadata(path)?.len();
        if len >= self.multipart_threshold {
            return self.multipart_upload(key, path, progress);
        }
        let reader = ProgressReader::new(BufReader::new(File::open(path)?), progress);
        self.put_stream(key, reader, len)?;
        Ok(len)
    }

    fn download_file(&self, key: &str, out: &mut dyn Write, progress: Progress<'_>) -> Result<u64> {
        let url = self
            .bucket
            .get_object(Some(&self.credentials), key)
            .sign(PRESIGN_DURATION);
        let resp = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| store_error(&format!("GET {key}"), e))?;
        let mut reader = ProgressReader::new(resp.into_reader(), progress);
        Ok(io::copy(&mut reader, out)?)
    }
}

fn store_error(op: &str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, resp) => {
            let body = resp.into_string().unwrap_or_default();
            let detail = body.trim();
            if detail.is_empty() {
                Error::Store(format!("S3 {op}: HTTP {code}"))
            } else {
                Error::Store(format!("S3 {op}: HTTP {code}: {detail}"))
            }
        }
        ureq::Error::Transport(t) => Error::Store(format!("S3 {op}: {t}")),
    }
}
