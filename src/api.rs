// API client module: a small blocking HTTP client for the Zenodo deposition
// API. Every operation is a single request/response pair; failures are the
// transport's status and body surfaced unchanged, with no retry layer.

use anyhow::{bail, Context, Result};
use reqwest::blocking::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::metadata::{today, Metadata};

const PRODUCTION_BASE: &str = "https://zenodo.org";
const SANDBOX_BASE: &str = "https://sandbox.zenodo.org";

/// Client for the Zenodo API. Holds a reqwest blocking client, the API base
/// URL, the access token sent with every request, and the local store used
/// for the key -> deposition-id mapping.
pub struct Zenodo {
    client: Client,
    api_base: String,
    access_token: String,
    store: ConfigStore,
    cache_dir: PathBuf,
}

/// Links block attached to depositions, records, and files. Only the links
/// the client follows are kept.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Links {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub latest: Option<String>,
    #[serde(default)]
    pub latest_draft: Option<String>,
    #[serde(default)]
    pub record_html: Option<String>,
    #[serde(rename = "self", default)]
    pub self_url: Option<String>,
}

/// A deposition as returned by the deposit endpoints. `metadata` stays a raw
/// JSON value: the service returns more fields than it accepts, and the
/// update flow sends it back amended rather than re-built.
#[derive(Deserialize, Debug, Clone)]
pub struct Deposition {
    pub id: u64,
    #[serde(default)]
    pub conceptrecid: Option<String>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub files: Vec<DepositionFile>,
    #[serde(default)]
    pub links: Links,
}

/// A file attached to a draft deposition.
#[derive(Deserialize, Debug, Clone)]
pub struct DepositionFile {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub links: Links,
}

/// A published record as returned by the records endpoints.
#[derive(Deserialize, Debug, Clone)]
pub struct Record {
    pub id: u64,
    pub conceptrecid: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub files: Vec<RecordFile>,
    #[serde(default)]
    pub links: Links,
}

/// A file attached to a published record.
#[derive(Deserialize, Debug, Clone)]
pub struct RecordFile {
    pub key: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub links: Links,
}

impl Zenodo {
    /// Create a client against the production service, or the sandbox when
    /// `sandbox` is true. The token is resolved from the argument, then the
    /// environment (`ZENODO_API_TOKEN` / `ZENODO_SANDBOX_API_TOKEN`), then
    /// the local config store key `api_token`.
    pub fn new(access_token: Option<String>, sandbox: bool) -> Result<Self> {
        let (base, module) = if sandbox {
            (SANDBOX_BASE, "zenodo:sandbox")
        } else {
            (PRODUCTION_BASE, "zenodo")
        };
        let store = ConfigStore::new(module);
        let access_token = match access_token {
            Some(token) => token,
            None => store.get("api_token").with_context(|| {
                format!(
                    "no API token configured; set {} or store api_token in the config file",
                    store.env_key("api_token")
                )
            })?,
        };
        Self::with_store(base, store, access_token)
    }

    pub fn production(access_token: Option<String>) -> Result<Self> {
        Self::new(access_token, false)
    }

    pub fn sandbox(access_token: Option<String>) -> Result<Self> {
        Self::new(access_token, true)
    }

    /// Build a client against an explicit base URL and store. This is the
    /// seam integration tests use to point the client at a mock server.
    pub fn with_store(base: &str, store: ConfigStore, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        let api_base = format!("{}/api", base.trim_end_matches('/'));
        debug!("using deposition API at {api_base}");
        let cache_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(store.module().replace(':', "-"));
        Ok(Zenodo {
            client,
            api_base,
            access_token,
            store,
            cache_dir,
        })
    }

    /// Override the directory downloaded files are cached under.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    fn depositions_base(&self) -> String {
        format!("{}/deposit/depositions", self.api_base)
    }

    fn token_query(&self) -> [(&str, &str); 1] {
        [("access_token", self.access_token.as_str())]
    }

    /// Surface a failed response as an error carrying the status and the
    /// unaltered body text.
    fn check(res: Response) -> Result<Response> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            bail!("API error ({status}): {body}");
        }
        Ok(res)
    }

    fn parse<T: DeserializeOwned>(res: Response) -> Result<T> {
        let body = Self::check(res)?
            .text()
            .context("failed to read API response body")?;
        serde_json::from_str(&body).context("failed to decode API response")
    }

    /// Create a new draft deposition with the given metadata. A 400 from the
    /// service surfaces its validation body verbatim.
    pub fn create_deposition(&self, metadata: &Metadata) -> Result<Deposition> {
        metadata.validate()?;
        let res = self
            .client
            .post(self.depositions_base())
            .query(&self.token_query())
            .json(&serde_json::json!({ "metadata": metadata }))
            .send()
            .context("failed to send create request")?;
        Self::parse(res)
    }

    /// List the depositions owned by the token's user.
    pub fn list_depositions(&self) -> Result<Vec<Deposition>> {
        let res = self
            .client
            .get(self.depositions_base())
            .query(&self.token_query())
            .send()
            .context("failed to send list request")?;
        Self::parse(res)
    }

    pub fn get_deposition(&self, deposition_id: u64) -> Result<Deposition> {
        let url = format!("{}/{deposition_id}", self.depositions_base());
        let res = self
            .client
            .get(url)
            .query(&self.token_query())
            .send()
            .context("failed to send get request")?;
        Self::parse(res)
    }

    /// Replace a deposition's metadata.
    pub fn update_metadata(&self, deposition_id: u64, metadata: &Metadata) -> Result<Deposition> {
        metadata.validate()?;
        self.put_metadata(deposition_id, &serde_json::to_value(metadata)?)
    }

    fn put_metadata(&self, deposition_id: u64, metadata: &Value) -> Result<Deposition> {
        let url = format!("{}/{deposition_id}", self.depositions_base());
        let res = self
            .client
            .put(url)
            .query(&self.token_query())
            .json(&serde_json::json!({ "metadata": metadata }))
            .send()
            .context("failed to send metadata update")?;
        Self::parse(res)
    }

    /// List the files attached to a draft deposition.
    pub fn list_files(&self, deposition_id: u64) -> Result<Vec<DepositionFile>> {
        let url = format!("{}/{deposition_id}/files", self.depositions_base());
        let res = self
            .client
            .get(url)
            .query(&self.token_query())
            .send()
            .context("failed to send file list request")?;
        Self::parse(res)
    }

    /// Remove a file from a draft deposition.
    pub fn delete_file(&self, deposition_id: u64, file_id: &str) -> Result<()> {
        let url = format!("{}/{deposition_id}/files/{file_id}", self.depositions_base());
        let res = self
            .client
            .delete(url)
            .query(&self.token_query())
            .send()
            .context("failed to send file delete request")?;
        Self::check(res)?;
        Ok(())
    }

    /// Upload each file to the deposition's bucket under its base name. The
    /// service hashes uploads, so re-sending unchanged files is a no-op on
    /// its side.
    pub fn upload_files<P: AsRef<Path>>(&self, bucket: &str, paths: &[P]) -> Result<()> {
        for path in paths {
            self.upload_file(bucket, path.as_ref())?;
        }
        Ok(())
    }

    fn upload_file(&self, bucket: &str, path: &Path) -> Result<()> {
        let name = file_name(path)?;
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        info!("uploading {name} to bucket");
        let url = format!("{}/{name}", bucket.trim_end_matches('/'));
        let res = self
            .client
            .put(url)
            .query(&self.token_query())
            .body(file)
            .send()
            .with_context(|| format!("failed to upload {}", path.display()))?;
        Self::check(res)?;
        Ok(())
    }

    /// Upload a file through the older multipart endpoint. Used for
    /// depositions whose responses carry no bucket link.
    pub fn upload_file_form(&self, deposition_id: u64, path: &Path) -> Result<DepositionFile> {
        let name = file_name(path)?;
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = multipart::Part::reader(file)
            .file_name(name.to_string())
            .mime_str(mime.essence_str())
            .context("invalid mime type for upload")?;
        let form = multipart::Form::new()
            .text("name", name.to_string())
            .part("file", part);

        let url = format!("{}/{deposition_id}/files", self.depositions_base());
        let res = self
            .client
            .post(url)
            .query(&self.token_query())
            .multipart(form)
            .send()
            .with_context(|| format!("failed to upload {}", path.display()))?;
        Self::parse(res)
    }

    /// Publish a draft deposition.
    pub fn publish(&self, deposition_id: u64, sleep: bool) -> Result<Deposition> {
        self.action(deposition_id, "publish", sleep)
    }

    /// Unlock an already submitted deposition for metadata editing.
    pub fn edit(&self, deposition_id: u64, sleep: bool) -> Result<Deposition> {
        self.action(deposition_id, "edit", sleep)
    }

    /// Discard the changes of the current editing session.
    pub fn discard(&self, deposition_id: u64, sleep: bool) -> Result<Deposition> {
        self.action(deposition_id, "discard", sleep)
    }

    /// Open a new version of a published deposition. The response's
    /// `latest_draft` link points at the new draft.
    pub fn new_version(&self, deposition_id: u64, sleep: bool) -> Result<Deposition> {
        self.action(deposition_id, "newversion", sleep)
    }

    fn action(&self, deposition_id: u64, action: &str, sleep: bool) -> Result<Deposition> {
        if sleep {
            // The service occasionally races consecutive actions on the
            // same deposition; a short pause avoids spurious conflicts.
            thread::sleep(Duration::from_secs(1));
        }
        let url = format!(
            "{}/{deposition_id}/actions/{action}",
            self.depositions_base()
        );
        let res = self
            .client
            .post(url)
            .query(&self.token_query())
            .send()
            .with_context(|| format!("failed to send {action} request"))?;
        Self::parse(res)
    }

    /// Create a deposition for `key` if none has been recorded locally, or
    /// upload a new version of the recorded one. On first creation the new
    /// deposition id is stored under `key`, so every later invocation with
    /// the same key reuses it.
    pub fn ensure<P: AsRef<Path>>(
        &self,
        key: &str,
        metadata: &Metadata,
        paths: &[P],
    ) -> Result<Deposition> {
        if let Some(stored) = self.store.get(key) {
            info!("mapped local key {key} to deposition {stored}");
            let deposition_id: u64 = stored.parse().with_context(|| {
                format!("stored deposition id {stored:?} for key {key} is not numeric")
            })?;
            return self.update(deposition_id, paths, true);
        }

        let deposition = self.create(metadata, paths, true)?;
        self.store.set(key, &deposition.id.to_string())?;
        Ok(deposition)
    }

    /// Create a deposition, upload the given files to its bucket, and
    /// publish it unless `publish` is false (the draft is returned instead).
    pub fn create<P: AsRef<Path>>(
        &self,
        metadata: &Metadata,
        paths: &[P],
        publish: bool,
    ) -> Result<Deposition> {
        let deposition = self.create_deposition(metadata)?;
        let bucket = deposition
            .links
            .bucket
            .clone()
            .with_context(|| format!("no bucket link in deposition {}", deposition.id))?;

        info!("uploading {} file(s) to bucket {bucket}", paths.len());
        self.upload_files(&bucket, paths)?;

        if !publish {
            return self.get_deposition(deposition.id);
        }
        info!("publishing deposition {}", deposition.id);
        self.publish(deposition.id, true)
    }

    /// Upload files as a new version of an existing deposition. A submitted
    /// deposition gets a fresh draft with a bumped version string first; an
    /// unsubmitted one is reused as-is.
    pub fn update<P: AsRef<Path>>(
        &self,
        deposition_id: u64,
        paths: &[P],
        publish: bool,
    ) -> Result<Deposition> {
        let deposition = self.get_deposition(deposition_id)?;
        let draft = if deposition.submitted {
            self.next_draft(&deposition)?
        } else {
            deposition
        };

        let bucket = draft
            .links
            .bucket
            .clone()
            .with_context(|| format!("no bucket link in deposition {}", draft.id))?;
        self.upload_files(&bucket, paths)?;

        if !publish {
            return self.get_deposition(draft.id);
        }
        self.publish(draft.id, true)
    }

    /// Open a new draft from a submitted deposition and stamp it with the
    /// next version string and today's publication date.
    fn next_draft(&self, deposition: &Deposition) -> Result<Deposition> {
        let old_version = deposition
            .metadata
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let new_version = next_version(old_version, &today());

        let res = self.new_version(deposition.id, false)?;
        let draft_url = res
            .links
            .latest_draft
            .with_context(|| format!("no latest_draft link for deposition {}", deposition.id))?;
        let draft_id = trailing_id(&draft_url)
            .with_context(|| format!("cannot parse draft id from {draft_url}"))?;

        // The fresh draft carries updated DOIs and links; fetch it rather
        // than patching the new-version response.
        let draft = self.get_deposition(draft_id)?;
        let mut metadata = draft.metadata.clone();
        if let Value::Object(map) = &mut metadata {
            map.insert("version".to_string(), Value::String(new_version));
            map.insert("publication_date".to_string(), Value::String(today()));
        }
        self.put_metadata(draft_id, &metadata)
    }

    /// Get the metadata for a published record.
    pub fn get_record(&self, record_id: u64) -> Result<Record> {
        let url = format!("{}/records/{record_id}", self.api_base);
        let res = self
            .client
            .get(url)
            .query(&self.token_query())
            .send()
            .context("failed to send record request")?;
        Self::parse(res)
    }

    /// Resolve the id of the latest record in the same concept as the given
    /// record. Works even when the given record already is the latest.
    pub fn get_latest_record(&self, record_id: u64) -> Result<u64> {
        let record = self.get_record(record_id)?;
        let latest = record
            .links
            .latest
            .with_context(|| format!("no latest link in record {record_id}"))?;
        let latest_id = trailing_id(&latest)
            .with_context(|| format!("cannot parse record id from {latest}"))?;
        debug!("latest for record {record_id} is record {latest_id}");
        Ok(latest_id)
    }

    /// Download the named file of a record into the local cache at
    /// `<cache>/<conceptrecid>/<version>/<name>`, returning the cached path.
    /// An already cached file is returned without a request unless `force`
    /// is set.
    pub fn download(&self, record_id: u64, name: &str, force: bool) -> Result<PathBuf> {
        let record = self.get_record(record_id)?;
        let version = record
            .metadata
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("v1")
            .to_string();
        debug!("version for record {record_id} is {version}");

        let file = record
            .files
            .iter()
            .find(|file| file.key == name)
            .with_context(|| format!("record {record_id} has no file named {name}"))?;
        let url = file
            .links
            .self_url
            .clone()
            .with_context(|| format!("file {name} of record {record_id} has no download link"))?;

        let dest = self
            .cache_dir
            .join(&record.conceptrecid)
            .join(&version)
            .join(name);
        if dest.exists() && !force {
            debug!("using cached copy at {}", dest.display());
            return Ok(dest);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        info!("downloading {name} from record {record_id}");
        let res = self
            .client
            .get(url)
            .query(&self.token_query())
            .send()
            .with_context(|| format!("failed to download {name}"))?;
        let mut res = Self::check(res)?;
        let mut out =
            File::create(&dest).with_context(|| format!("failed to create {}", dest.display()))?;
        res.copy_to(&mut out)
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(dest)
    }

    /// Download the named file from the latest version of the record's
    /// concept.
    pub fn download_latest(&self, record_id: u64, name: &str, force: bool) -> Result<PathBuf> {
        let latest_id = self.get_latest_record(record_id)?;
        self.download(latest_id, name, force)
    }
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("path {} has no usable file name", path.display()))
}

/// Last numeric path segment of a URL. The service's `latest` and
/// `latest_draft` links differ in shape (`.../records/123` vs
/// `.../records/123/versions/latest`), so this scans from the end.
fn trailing_id(url: &str) -> Option<u64> {
    url.split('/')
        .rev()
        .find_map(|segment| segment.parse::<u64>().ok())
}

/// Derive the next version string from the previous one. Versions are
/// upload dates; a same-day re-upload gets a numeric suffix.
fn next_version(old_version: &str, today: &str) -> String {
    if old_version == today {
        return format!("{today}-1");
    }
    if let Some(suffix) = old_version
        .strip_prefix(today)
        .and_then(|rest| rest.strip_prefix('-'))
    {
        if let Ok(n) = suffix.parse::<u32>() {
            return format!("{today}-{}", n + 1);
        }
    }
    today.to_string()
}

#[cfg(test)]
mod tests {
    use super::{next_version, trailing_id};

    #[test]
    fn version_moves_to_today() {
        assert_eq!(next_version("2021-01-01", "2021-01-02"), "2021-01-02");
    }

    #[test]
    fn same_day_reupload_gets_suffix() {
        assert_eq!(next_version("2021-01-02", "2021-01-02"), "2021-01-02-1");
    }

    #[test]
    fn same_day_suffix_increments() {
        assert_eq!(next_version("2021-01-02-1", "2021-01-02"), "2021-01-02-2");
        assert_eq!(next_version("2021-01-02-9", "2021-01-02"), "2021-01-02-10");
        assert_eq!(next_version("2021-01-02-10", "2021-01-02"), "2021-01-02-11");
    }

    #[test]
    fn non_date_version_is_replaced() {
        assert_eq!(next_version("v1", "2021-01-02"), "2021-01-02");
        assert_eq!(next_version("", "2021-01-02"), "2021-01-02");
    }

    #[test]
    fn trailing_id_handles_both_link_shapes() {
        assert_eq!(trailing_id("https://zenodo.org/api/records/123"), Some(123));
        assert_eq!(
            trailing_id("https://zenodo.org/api/records/123/versions/latest"),
            Some(123)
        );
        assert_eq!(
            trailing_id("https://zenodo.org/api/deposit/depositions/456"),
            Some(456)
        );
        assert_eq!(trailing_id("https://zenodo.org/api/records"), None);
    }
}
