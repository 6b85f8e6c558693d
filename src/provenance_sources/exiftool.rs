use crate::config::AppConfig;
use crate::error::AppError;
use crate::metadata::Thumbnails;
use crate::provenance::{
    Action, BasicInfo, C2paData, CreativeWork, MinimalC2pa, OneOrMany, Person, SignatureInfo,
    SoftwareAgent, Verification,
};
use crate::provenance_source::ProvenanceSource;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Value};
use std::path::Path;
use tokio::process::Command;

const PROVENANCE_TAGS: &[&str] = &["-Actions*", "-C2PA*", "-Claim*", "-Author*", "-MetadataDate"];
const MINIMAL_TAGS: &[&str] = &["-AuthorName", "-Claim_Generator_InfoName", "-MetadataDate"];

/// Shells out to `exiftool`. It exposes C2PA fields but does not validate
/// signatures, so every manifest it reads is reported as not verified.
pub struct Exiftool {
    program: String,
}

impl Exiftool {
    pub fn new(config: &AppConfig) -> Self {
        log::debug!("Initializing exiftool provenance source: {}", config.exiftool_path);
        Self {
            program: config.exiftool_path.clone(),
        }
    }

    async fn run(&self, args: &[&str], path: &Path) -> Result<Option<Vec<u8>>, AppError> {
        log::trace!("Running {} {:?} {:?}", self.program, args, path);
        let output = Command::new(&self.program)
            .args(args)
            .arg(path)
            .output()
            .await
            .map_err(|e| AppError::Tool(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            log::warn!(
                "{} exited with {} for {:?}: {}",
                self.program,
                output.status,
                path,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }
        Ok((!output.stdout.is_empty()).then_some(output.stdout))
    }

    async fn read_tags(&self, tags: &[&str], path: &Path) -> Result<Option<C2paData>, AppError> {
        let mut args = vec!["-json"];
        args.extend_from_slice(tags);
        let Some(stdout) = self.run(&args, path).await? else {
            return Ok(None);
        };
        Ok(parse_exiftool_json(&String::from_utf8_lossy(&stdout)))
    }

    async fn binary_tag(&self, tag: &str, path: &Path) -> Option<String> {
        match self.run(&["-b", tag], path).await {
            Ok(bytes) => bytes.map(|b| STANDARD.encode(b)),
            Err(e) => {
                log::warn!("Error extracting {} from {:?}: {}", tag, path, e);
                None
            }
        }
    }
}

#[async_trait]
impl ProvenanceSource for Exiftool {
    async fn extract_provenance(&self, path: &Path) -> Result<Option<C2paData>, AppError> {
        self.read_tags(PROVENANCE_TAGS, path).await
    }

    async fn extract_minimal(&self, path: &Path) -> Result<Option<MinimalC2pa>, AppError> {
        Ok(self.read_tags(MINIMAL_TAGS, path).await?.map(|data| MinimalC2pa {
            signature_info: data.signature_info,
            author_info: data.author_info,
            verification: data.verification,
        }))
    }

    async fn extract_thumbnails(&self, path: &Path) -> Result<Thumbnails, AppError> {
        Ok(Thumbnails {
            claim_thumbnail: self.binary_tag("-C2PAThumbnailClaimJpegData", path).await,
            ingredient_thumbnail: self.binary_tag("-C2PAThumbnailIngredientJpegData", path).await,
        })
    }
}

fn text(tags: &Map<String, Value>, key: &str) -> Option<String> {
    match tags.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
        _ => None,
    }
}

/// Repeated tags come back as an array, single ones as a scalar.
fn list(tags: &Map<String, Value>, key: &str) -> Vec<String> {
    match tags.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Number(n)) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// Maps `exiftool -json` output onto the manifest model. `None` if the file
/// carries no C2PA tags.
pub fn parse_exiftool_json(stdout: &str) -> Option<C2paData> {
    let records: Vec<Map<String, Value>> = match serde_json::from_str(stdout) {
        Ok(records) => records,
        Err(e) => {
            log::warn!("Unexpected exiftool output: {}", e);
            return None;
        }
    };
    let tags = records.into_iter().next()?;
    if !tags.keys().any(|k| k != "SourceFile") {
        return None;
    }

    let claim_generator = text(&tags, "Claim_generator").or_else(|| {
        let name = text(&tags, "Claim_Generator_InfoName")?;
        Some(match text(&tags, "Claim_Generator_InfoVersion") {
            Some(version) => format!("{}/{}", name, version),
            None => name,
        })
    });

    let issuer = text(&tags, "Claim_Generator_InfoName");
    let time = text(&tags, "MetadataDate");
    let signature_info = (issuer.is_some() || time.is_some() || tags.contains_key("Signature"))
        .then(|| SignatureInfo {
            issuer,
            time,
            ..Default::default()
        });

    let whens = list(&tags, "ActionsWhen");
    let agents = list(&tags, "ActionsSoftwareAgentName");
    let actions = list(&tags, "ActionsAction")
        .into_iter()
        .enumerate()
        .map(|(i, action)| Action {
            action,
            when: whens.get(i).cloned(),
            software_agent: agents.get(i).cloned().map(SoftwareAgent::Name),
            parameters: tags
                .get("ActionsParameters")
                .cloned()
                .unwrap_or_else(|| Value::Object(Map::new())),
        })
        .collect();

    let author_info = text(&tags, "AuthorName").map(|name| CreativeWork {
        author: Some(OneOrMany::One(Person {
            name: Some(name),
            ..Default::default()
        })),
        ..Default::default()
    });

    let mut data = C2paData::from_parts(
        BasicInfo {
            claim_generator,
            ..Default::default()
        },
        signature_info,
        Vec::new(),
        Vec::new(),
        Verification::NotVerified,
    );
    data.actions = actions;
    data.author_info = author_info;
    Some(data)
}
