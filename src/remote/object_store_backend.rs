//! S3 兼容后端，基于 `object_store`。
//!
//! 小对象单次 PUT；超过 `MULTIPART_THRESHOLD` 的对象分片上传，任一分片失败即中止。
//! 客户端自身的重试关闭，重试统一由上层 `retry_with_backoff` 负责。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ClientOptions, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, RetryConfig,
};

use super::{CACHE_CONTROL, StorageBackend, StorageError};
use crate::settings::StorageSettings;

/// 超过该体积走分片上传。
pub const MULTIPART_THRESHOLD: usize = 16 * 1024 * 1024;

/// 分片大小。
pub const MULTIPART_PART_SIZE: usize = 8 * 1024 * 1024;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(300);

/// `object_store` 实现的存储后端。
pub struct ObjectStoreBackend {
    client: RwLock<Option<Arc<dyn ObjectStore>>>,
    /// 固定使用的存储（测试用内存桶）；为 `None` 时按配置构建 S3 客户端。
    pinned: Option<Arc<dyn ObjectStore>>,
    multipart_threshold: usize,
    part_size: usize,
}

impl Default for ObjectStoreBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStoreBackend {
    pub fn new() -> Self {
        Self {
            client: RwLock::new(None),
            pinned: None,
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: MULTIPART_PART_SIZE,
        }
    }

    /// 使用现成的存储实例（如 `InMemory`），配置齐全时启用。
    pub fn with_store(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            pinned: Some(store),
            ..Self::new()
        }
    }

    /// 调整分片阈值与分片大小。
    pub fn with_multipart(mut self, threshold: usize, part_size: usize) -> Self {
        self.multipart_threshold = threshold.max(1);
        self.part_size = part_size.max(1);
        self
    }

    fn client(&self) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let guard = self
            .client
            .read()
            .map_err(|_| StorageError::invalid_settings("存储客户端锁已损坏"))?;
        guard
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| StorageError::not_configured("客户端尚未初始化"))
    }

    fn build_s3(settings: &StorageSettings) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let client_options = ClientOptions::new()
            .with_allow_http(true)
            .with_timeout(CLIENT_TIMEOUT);
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };

        let store = AmazonS3Builder::new()
            .with_endpoint(settings.endpoint.trim())
            .with_region(settings.region.trim())
            .with_bucket_name(settings.bucket.trim())
            .with_access_key_id(settings.access_key_id.trim())
            .with_secret_access_key(settings.secret_access_key.trim())
            .with_virtual_hosted_style_request(false)
            .with_client_options(client_options)
            .with_retry(retry)
            .build()
            .map_err(|e| StorageError::invalid_settings(e.to_string()))?;

        Ok(Arc::new(store))
    }

    fn attributes(content_type: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::CacheControl, AttributeValue::from(CACHE_CONTROL));
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        attributes
    }

    async fn put_multipart(
        &self,
        store: &dyn ObjectStore,
        path: &ObjectPath,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let opts = PutMultipartOpts {
            attributes: Self::attributes(content_type),
            ..PutMultipartOpts::default()
        };
        let mut upload = store.put_multipart_opts(path, opts).await?;

        let mut offset = 0;
        while offset < bytes.len() {
            let end = (offset + self.part_size).min(bytes.len());
            let part = PutPayload::from(bytes.slice(offset..end));
            if let Err(err) = upload.put_part(part).await {
                log::warn!("❌ 分片上传失败，中止 - {}: {}", path, err);
                if let Err(abort_err) = upload.abort().await {
                    log::warn!("⚠️ 中止分片上传失败 - {}: {}", path, abort_err);
                }
                return Err(err.into());
            }
            offset = end;
        }

        if let Err(err) = upload.complete().await {
            if let Err(abort_err) = upload.abort().await {
                log::warn!("⚠️ 中止分片上传失败 - {}: {}", path, abort_err);
            }
            return Err(err.into());
        }

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn initialize(&self, settings: &StorageSettings) -> Result<(), StorageError> {
        let next = if !settings.is_configured() {
            None
        } else if let Some(store) = &self.pinned {
            Some(Arc::clone(store))
        } else {
            Some(Self::build_s3(settings)?)
        };

        let mut guard = self
            .client
            .write()
            .map_err(|_| StorageError::invalid_settings("存储客户端锁已损坏"))?;
        *guard = next;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.client
            .read()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    async fn test_connection(&self) -> Result<(), StorageError> {
        let store = self.client()?;
        store
            .list_with_delimiter(None)
            .await
            .map_err(|e| StorageError::connection(e.to_string()))?;
        Ok(())
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), StorageError> {
        let store = self.client()?;
        let path = ObjectPath::parse(key)
            .map_err(|e| StorageError::invalid_settings(format!("对象键无效 `{}`: {}", key, e)))?;

        if bytes.len() > self.multipart_threshold {
            log::debug!(
                "📦 分片上传 - {} ({} 片)",
                path,
                bytes.len().div_ceil(self.part_size)
            );
            return self
                .put_multipart(store.as_ref(), &path, bytes, content_type)
                .await;
        }

        let opts = PutOptions {
            attributes: Self::attributes(content_type),
            ..PutOptions::default()
        };
        store
            .put_opts(&path, PutPayload::from(bytes), opts)
            .await?;
        Ok(())
    }
}
