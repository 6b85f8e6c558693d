use crate::error::AppError;
use crate::metadata::Thumbnails;
use crate::provenance::{
    Assertion, BasicInfo, C2paData, CreativeWork, IngredientSummary, MinimalC2pa, SignatureInfo,
    Verification, CREATIVE_WORK_LABEL,
};
use crate::provenance_source::ProvenanceSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use c2pa::Reader;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

/// Untrusted signing certificates still carry a cryptographically valid signature.
const UNTRUSTED_CREDENTIAL: &str = "signingCredential.untrusted";

/// Reads manifests in-process with the `c2pa` crate.
pub struct C2paLibrary;

impl C2paLibrary {
    pub fn new() -> Self {
        log::debug!("Initializing c2pa library provenance source.");
        Self
    }
}

#[async_trait]
impl ProvenanceSource for C2paLibrary {
    async fn extract_provenance(&self, path: &Path) -> Result<Option<C2paData>, AppError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_provenance(&path)).await?
    }

    async fn extract_minimal(&self, path: &Path) -> Result<Option<MinimalC2pa>, AppError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_minimal(&path)).await?
    }

    async fn extract_thumbnails(&self, path: &Path) -> Result<Thumbnails, AppError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_thumbnails(&path)).await?
    }
}

#[derive(Debug, Deserialize)]
struct ManifestStore<M> {
    active_manifest: Option<String>,
    #[serde(default = "HashMap::new")]
    manifests: HashMap<String, M>,
    #[serde(default)]
    validation_state: Option<String>,
    #[serde(default)]
    validation_status: Vec<ValidationEntry>,
    #[serde(default)]
    validation_results: Option<ValidationResults>,
}

#[derive(Debug, Deserialize)]
struct ValidationEntry {
    code: String,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidationResults {
    #[serde(rename = "activeManifest", default)]
    active_manifest: Option<StatusCodes>,
}

#[derive(Debug, Deserialize)]
struct StatusCodes {
    #[serde(default)]
    failure: Vec<ValidationEntry>,
}

impl<M> ManifestStore<M> {
    fn verification(&self) -> Verification {
        match self.validation_state.as_deref() {
            Some("Trusted") => return Verification::Trusted,
            Some("Valid") => return Verification::Valid,
            Some("Invalid") => return Verification::Invalid,
            _ => {}
        }

        let active_failures = self
            .validation_results
            .as_ref()
            .and_then(|r| r.active_manifest.as_ref())
            .map(|s| s.failure.as_slice())
            .unwrap_or_default();
        let mut failures = self
            .validation_status
            .iter()
            .chain(active_failures)
            .filter(|e| e.code != UNTRUSTED_CREDENTIAL)
            .peekable();

        if failures.peek().is_none() {
            return Verification::Valid;
        }
        for failure in failures {
            log::debug!(
                "Manifest validation failure {}: {}",
                failure.code,
                failure.explanation.as_deref().unwrap_or("")
            );
        }
        Verification::Invalid
    }

    /// The active manifest, if the store names one that exists.
    fn into_active(mut self) -> Option<(M, Verification)> {
        let verification = self.verification();
        let label = self.active_manifest.take()?;
        let manifest = self.manifests.remove(&label)?;
        Some((manifest, verification))
    }
}

#[derive(Debug, Deserialize)]
struct ResourceRef {
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct GeneratorInfo {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ManifestAssertion {
    label: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ManifestIngredient {
    title: Option<String>,
    format: Option<String>,
    relationship: Option<String>,
    instance_id: Option<String>,
    thumbnail: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    title: Option<String>,
    format: Option<String>,
    instance_id: Option<String>,
    claim_generator: Option<String>,
    #[serde(default)]
    claim_generator_info: Vec<GeneratorInfo>,
    signature_info: Option<SignatureInfo>,
    #[serde(default)]
    assertions: Vec<ManifestAssertion>,
    #[serde(default)]
    ingredients: Vec<ManifestIngredient>,
    thumbnail: Option<ResourceRef>,
}

impl Manifest {
    /// v2 claims drop `claim_generator` in favour of `claim_generator_info`.
    fn claim_generator(&self) -> Option<String> {
        if let Some(generator) = &self.claim_generator {
            return Some(generator.clone());
        }
        let info = self.claim_generator_info.first()?;
        Some(match &info.version {
            Some(version) => format!("{}/{}", info.name, version),
            None => info.name.clone(),
        })
    }
}

/// Assertion payloads stay unparsed until one is needed.
#[derive(Debug, Deserialize)]
struct LazyAssertion {
    label: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

#[derive(Debug, Deserialize)]
struct MinimalManifest {
    signature_info: Option<SignatureInfo>,
    #[serde(default)]
    assertions: Vec<LazyAssertion>,
}

fn open_reader(path: &Path) -> Result<Option<Reader>, AppError> {
    let format = mime_guess::from_path(path).first_or(mime::IMAGE_JPEG);
    let file = File::open(path)?;

    match Reader::from_stream(format.essence_str(), file) {
        Ok(reader) => Ok(Some(reader)),
        Err(c2pa::Error::JumbfNotFound) => {
            log::debug!("No C2PA manifest in {:?}", path);
            Ok(None)
        }
        Err(e) => {
            log::warn!("Could not read C2PA manifest from {:?}: {}", path, e);
            Ok(None)
        }
    }
}

fn parse_store<M: DeserializeOwned>(reader: &Reader, path: &Path) -> Option<(M, Verification)> {
    let json = reader.json();
    if json.is_empty() {
        return None;
    }
    match serde_json::from_str::<ManifestStore<M>>(&json) {
        Ok(store) => {
            let active = store.into_active();
            if active.is_none() {
                log::debug!("Manifest store in {:?} has no active manifest", path);
            }
            active
        }
        Err(e) => {
            log::warn!("Unexpected manifest JSON in {:?}: {}", path, e);
            None
        }
    }
}

fn read_provenance(path: &Path) -> Result<Option<C2paData>, AppError> {
    let Some(reader) = open_reader(path)? else {
        return Ok(None);
    };
    let Some((manifest, verification)) = parse_store::<Manifest>(&reader, path) else {
        return Ok(None);
    };

    let basic_info = BasicInfo {
        title: manifest.title.clone(),
        format: manifest.format.clone(),
        instance_id: manifest.instance_id.clone(),
        claim_generator: manifest.claim_generator(),
    };
    let assertions = manifest
        .assertions
        .into_iter()
        .map(|a| Assertion {
            label: a.label,
            data: a.data,
        })
        .collect();
    let ingredients = manifest
        .ingredients
        .into_iter()
        .map(|i| IngredientSummary {
            title: i.title,
            format: i.format,
            relationship: i.relationship,
            instance_id: i.instance_id,
        })
        .collect();

    Ok(Some(C2paData::from_parts(
        basic_info,
        manifest.signature_info,
        assertions,
        ingredients,
        verification,
    )))
}

fn read_minimal(path: &Path) -> Result<Option<MinimalC2pa>, AppError> {
    let Some(reader) = open_reader(path)? else {
        return Ok(None);
    };
    let Some((manifest, verification)) = parse_store::<MinimalManifest>(&reader, path) else {
        return Ok(None);
    };

    let author_info = manifest
        .assertions
        .iter()
        .find(|a| a.label == CREATIVE_WORK_LABEL)
        .and_then(|a| a.data.as_ref())
        .and_then(|raw| match serde_json::from_str::<CreativeWork>(raw.get()) {
            Ok(work) => Some(work),
            Err(e) => {
                log::warn!("Malformed CreativeWork assertion in {:?}: {}", path, e);
                None
            }
        });

    Ok(Some(MinimalC2pa {
        signature_info: manifest.signature_info,
        author_info,
        verification,
    }))
}

fn read_thumbnails(path: &Path) -> Result<Thumbnails, AppError> {
    let Some(reader) = open_reader(path)? else {
        return Ok(Thumbnails::default());
    };
    let Some((manifest, _)) = parse_store::<Manifest>(&reader, path) else {
        return Ok(Thumbnails::default());
    };
    Ok(manifest_thumbnails(&reader, &manifest))
}

/// Each thumbnail is looked up on its own; a missing one leaves the other intact.
fn manifest_thumbnails(reader: &Reader, manifest: &Manifest) -> Thumbnails {
    let mut thumbnails = Thumbnails::default();
    if let Some(thumb) = &manifest.thumbnail {
        thumbnails.claim_thumbnail = resource_base64(reader, &thumb.identifier, "claim");
    }
    if let Some(thumb) = manifest.ingredients.first().and_then(|i| i.thumbnail.as_ref()) {
        thumbnails.ingredient_thumbnail = resource_base64(reader, &thumb.identifier, "ingredient");
    }
    thumbnails
}

fn resource_base64(reader: &Reader, identifier: &str, kind: &str) -> Option<String> {
    let mut stream = Cursor::new(Vec::new());
    match reader.resource_to_stream(identifier, &mut stream) {
        Ok(_) => {
            let bytes = stream.into_inner();
            log::trace!("Extracted {} thumbnail ({} bytes)", kind, bytes.len());
            Some(STANDARD.encode(bytes))
        }
        Err(e) => {
            log::warn!("Error extracting {} thumbnail {}: {}", kind, identifier, e);
            None
        }
    }
}
