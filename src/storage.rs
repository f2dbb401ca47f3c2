use anyhow::{Context, Result, bail};
use aws_sdk_s3::{Client, config::Region, primitives::ByteStream};
use futures::{StreamExt, TryStreamExt, stream};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::args::Args;
use crate::common::{download_file, ensure_parent_dir, file_name_from_url};
use crate::constants::{DOWNLOAD_CONCURRENCY, INPUT_EXTENSIONS};

/// Where a dataset is read from or written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    S3 { bucket: String, prefix: String },
    Http(String),
}

impl Location {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if let Some(rest) = trimmed
            .strip_prefix("s3://")
            .or_else(|| trimmed.strip_prefix("s3a://"))
        {
            let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
            if bucket.is_empty() {
                bail!("S3 location {raw} is missing a bucket name");
            }
            return Ok(Location::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            });
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(Location::Http(trimmed.to_string()));
        }
        if trimmed.is_empty() {
            bail!("Empty location");
        }
        Ok(Location::Local(PathBuf::from(trimmed)))
    }

    pub fn is_s3(&self) -> bool {
        matches!(self, Location::S3 { .. })
    }

    /// Prefix/directory form with a trailing separator, used when writing objects.
    fn dir_prefix(prefix: &str) -> String {
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}/")
        }
    }

    /// Location of a file named `name` inside this directory-like location.
    pub fn child(&self, name: &str) -> Result<Location> {
        match self {
            Location::Local(dir) => Ok(Location::Local(dir.join(name))),
            Location::S3 { bucket, prefix } => Ok(Location::S3 {
                bucket: bucket.clone(),
                prefix: format!("{}{name}", Self::dir_prefix(prefix)),
            }),
            Location::Http(url) => bail!("HTTP location {url} is read-only"),
        }
    }

    /// `true` when one location is the other or lies inside it, so clearing one
    /// before publishing would remove the other's files.
    pub fn overlaps(&self, other: &Location) -> bool {
        match (self, other) {
            (Location::Local(a), Location::Local(b)) => {
                let a = std::path::absolute(a).unwrap_or_else(|_| a.clone());
                let b = std::path::absolute(b).unwrap_or_else(|_| b.clone());
                a.starts_with(&b) || b.starts_with(&a)
            }
            (
                Location::S3 { bucket: a_bucket, prefix: a_prefix },
                Location::S3 { bucket: b_bucket, prefix: b_prefix },
            ) => {
                let a = Self::dir_prefix(a_prefix);
                let b = Self::dir_prefix(b_prefix);
                a_bucket == b_bucket && (a.starts_with(&b) || b.starts_with(&a))
            }
            (Location::Http(a), Location::Http(b)) => a == b,
            _ => false,
        }
    }

    /// `<location>_reports`, a sibling of a directory-like location.
    pub fn reports_sibling(&self) -> Result<Location> {
        match self {
            Location::Local(dir) => {
                let name = dir
                    .file_name()
                    .and_then(|x| x.to_str())
                    .context("Cannot derive a reports location from the output path")?;
                Ok(Location::Local(dir.with_file_name(format!("{name}_reports"))))
            }
            Location::S3 { bucket, prefix } => {
                let trimmed = prefix.trim_matches('/');
                if trimmed.is_empty() {
                    bail!("Cannot derive a reports location from bucket root s3://{bucket}/");
                }
                Ok(Location::S3 {
                    bucket: bucket.clone(),
                    prefix: format!("{trimmed}_reports/"),
                })
            }
            Location::Http(url) => bail!("HTTP location {url} is read-only"),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::S3 { bucket, prefix } => write!(f, "s3://{bucket}/{prefix}"),
            Location::Http(url) => f.write_str(url),
        }
    }
}

fn has_input_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            INPUT_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

fn collect_input_files_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed reading directory {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("Failed iterating {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            collect_input_files_recursive(&path, out)?;
        } else if path
            .file_name()
            .and_then(|x| x.to_str())
            .is_some_and(has_input_extension)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// A single file is taken as-is; a directory is scanned recursively. Sorted by path.
pub fn collect_local_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        bail!("Input location {} does not exist", path.display());
    }
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    collect_input_files_recursive(path, &mut files)?;
    files.sort();
    Ok(files)
}

/// Removes every file below `dir`, keeping the directory itself.
fn clear_local_dir(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    if !dir.is_dir() {
        bail!("Output location {} is not a directory", dir.display());
    }
    let mut removed = 0usize;
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed reading directory {}", dir.display()))?
    {
        let path = entry
            .with_context(|| format!("Failed iterating {}", dir.display()))?
            .path();
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed removing {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("Failed removing {}", path.display()))?;
        }
        removed += 1;
    }
    Ok(removed)
}

#[derive(Debug, Clone)]
pub struct S3Options {
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
}

impl From<&Args> for S3Options {
    fn from(args: &Args) -> Self {
        Self {
            endpoint: args.s3_endpoint.clone(),
            region: args.s3_region.clone(),
            force_path_style: args.s3_force_path_style,
        }
    }
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn connect(opts: &S3Options) -> Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(opts.region.clone()))
            .load()
            .await;

        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(opts.force_path_style);
        if let Some(endpoint) = &opts.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        tracing::info!(
            "S3 client initialized (region={} endpoint={})",
            opts.region,
            opts.endpoint.as_deref().unwrap_or("default")
        );
        Ok(Self { client })
    }

    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page =
                page.with_context(|| format!("Failed listing s3://{bucket}/{prefix}"))?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );
        }
        keys.sort();
        Ok(keys)
    }

    pub async fn download_to(&self, bucket: &str, key: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed downloading s3://{bucket}/{key}"))?;
        let data = response
            .body
            .collect()
            .await
            .with_context(|| format!("Failed reading body of s3://{bucket}/{key}"))?
            .into_bytes();

        ensure_parent_dir(dest)?;
        tokio::fs::write(dest, &data)
            .await
            .with_context(|| format!("Failed writing {}", dest.display()))?;
        tracing::debug!("Downloaded {} bytes from s3://{bucket}/{key}", data.len());
        Ok(())
    }

    pub async fn upload_file(&self, src: &Path, bucket: &str, key: &str) -> Result<()> {
        let body = ByteStream::from_path(src)
            .await
            .with_context(|| format!("Failed opening {} for upload", src.display()))?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed uploading {} to s3://{bucket}/{key}", src.display()))?;
        tracing::info!("Uploaded {} -> s3://{bucket}/{key}", src.display());
        Ok(())
    }

    pub async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let keys = self.list_keys(bucket, prefix).await?;
        for key in &keys {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .with_context(|| format!("Failed deleting s3://{bucket}/{key}"))?;
        }
        Ok(keys.len())
    }
}

/// Uniform access to local, S3 and HTTP locations. The S3 client is only built
/// when a job actually touches S3.
pub struct Storage {
    s3: Option<S3Store>,
    http: reqwest::Client,
}

impl Storage {
    pub async fn for_locations(locations: &[&Location], opts: &S3Options) -> Result<Self> {
        let s3 = if locations.iter().any(|loc| loc.is_s3()) {
            Some(S3Store::connect(opts).await?)
        } else {
            None
        };
        let http = reqwest::Client::builder()
            .user_agent("build-silver-providers/0.1")
            .build()
            .context("Failed creating HTTP client")?;
        Ok(Self { s3, http })
    }

    fn s3(&self) -> Result<&S3Store> {
        self.s3
            .as_ref()
            .context("S3 location used but no S3 client was configured")
    }

    /// Resolves `source` to local input files, downloading remote objects into
    /// `download_dir`. Files come back in a stable (sorted) order.
    pub async fn fetch_inputs(&self, source: &Location, download_dir: &Path) -> Result<Vec<PathBuf>> {
        match source {
            Location::Local(path) => collect_local_inputs(path),
            Location::Http(url) => {
                let dest = download_dir.join(file_name_from_url(url)?);
                download_file(&self.http, url, &dest).await?;
                Ok(vec![dest])
            }
            Location::S3 { bucket, prefix } => {
                let store = self.s3()?;
                let keys: Vec<String> = store
                    .list_keys(bucket, prefix)
                    .await?
                    .into_iter()
                    .filter(|key| has_input_extension(key))
                    .collect();
                tracing::info!(
                    "Found {} input objects under s3://{bucket}/{prefix}",
                    keys.len()
                );

                let targets: Vec<(String, PathBuf)> = keys
                    .into_iter()
                    .enumerate()
                    .map(|(idx, key)| {
                        let file_name = key.rsplit('/').next().unwrap_or(&key).to_string();
                        let dest = download_dir.join(format!("{idx:06}-{file_name}"));
                        (key, dest)
                    })
                    .collect();

                stream::iter(targets.iter().map(|(key, dest)| async move {
                    store.download_to(bucket, key, dest).await
                }))
                .buffer_unordered(DOWNLOAD_CONCURRENCY)
                .try_collect::<Vec<()>>()
                .await?;

                Ok(targets.into_iter().map(|(_, dest)| dest).collect())
            }
        }
    }

    /// Removes everything currently stored under `location`.
    pub async fn clear(&self, location: &Location) -> Result<usize> {
        match location {
            Location::Local(dir) => clear_local_dir(dir),
            Location::S3 { bucket, prefix } => {
                let prefix = Location::dir_prefix(prefix);
                if prefix.is_empty() {
                    bail!("Refusing to clear the root of bucket {bucket}");
                }
                self.s3()?.delete_prefix(bucket, &prefix).await
            }
            Location::Http(url) => bail!("HTTP location {url} is read-only"),
        }
    }

    /// Copies the local file `src` to `dest`.
    pub async fn put_file(&self, src: &Path, dest: &Location) -> Result<()> {
        match dest {
            Location::Local(path) => {
                ensure_parent_dir(path)?;
                fs::copy(src, path).with_context(|| {
                    format!("Failed copying {} to {}", src.display(), path.display())
                })?;
                Ok(())
            }
            Location::S3 { bucket, prefix } => self.s3()?.upload_file(src, bucket, prefix).await,
            Location::Http(url) => bail!("HTTP location {url} is read-only"),
        }
    }
}
