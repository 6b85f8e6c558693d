//! C2PA manifest data as the viewer sees it, and the flattened provenance list.

use crate::display::{format_claim_generator, format_datetime_full, Zone};
use crate::metadata::MiniResponse;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub const ACTIONS_LABEL: &str = "c2pa.actions.v2";
pub const CREATIVE_WORK_LABEL: &str = "stds.schema-org.CreativeWork";

/// Either a single value or a list of them; schema.org allows both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::Many(items) => items.first(),
            OneOrMany::One(item) => Some(item),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::Many(items) => items.iter(),
            OneOrMany::One(item) => std::slice::from_ref(item).iter(),
        }
    }
}

/// A bare name or an object with a `name`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Named {
    Text(String),
    Entity {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(flatten)]
        other: Map<String, Value>,
    },
}

impl Named {
    pub fn name(&self) -> Option<&str> {
        match self {
            Named::Text(name) => Some(name),
            Named::Entity { name, .. } => name.as_deref(),
        }
    }
}

/// A schema.org person. Parsing never fails: fields of an unexpected shape
/// are left in `other`.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Person {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "sameAs", skip_serializing_if = "Option::is_none")]
    pub same_as: Option<OneOrMany<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Value>,
    #[serde(rename = "jobTitle", skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(rename = "worksFor", skip_serializing_if = "Option::is_none")]
    pub works_for: Option<Named>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Person {
    /// An object is read field by field; a bare string is taken as the name.
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::from_fields(fields),
            other => Self {
                name: text(&other),
                ..Default::default()
            },
        }
    }

    fn from_fields(mut fields: Map<String, Value>) -> Self {
        Self {
            name: take_text(&mut fields, "name"),
            identifier: fields.remove("identifier"),
            url: take_text(&mut fields, "url"),
            same_as: take_texts(&mut fields, "sameAs"),
            email: take_text(&mut fields, "email"),
            telephone: take_text(&mut fields, "telephone"),
            address: fields.remove("address"),
            job_title: take_text(&mut fields, "jobTitle"),
            works_for: take_named(&mut fields, "worksFor"),
            other: fields,
        }
    }
}

impl<'de> Deserialize<'de> for Person {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Person::from_value)
    }
}

/// The `stds.schema-org.CreativeWork` assertion.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct CreativeWork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<OneOrMany<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<OneOrMany<Person>>,
    #[serde(rename = "copyrightHolder", skip_serializing_if = "Option::is_none")]
    pub copyright_holder: Option<OneOrMany<Person>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<Named>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl<'de> Deserialize<'de> for CreativeWork {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let Value::Object(mut fields) = Value::deserialize(deserializer)? else {
            return Err(de::Error::custom("CreativeWork assertion is not an object"));
        };
        Ok(Self {
            name: take_text(&mut fields, "name"),
            description: take_text(&mut fields, "description"),
            keywords: take_texts(&mut fields, "keywords"),
            author: take_people(&mut fields, "author"),
            copyright_holder: take_people(&mut fields, "copyrightHolder"),
            publisher: take_named(&mut fields, "publisher"),
            other: fields,
        })
    }
}

/// A string or number, or the first such entry of a list.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.iter().find_map(text),
        _ => None,
    }
}

/// Removes `key` if it holds text. Anything else stays in `fields`.
fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    let found = text(fields.get(key)?);
    match found {
        Some(_) => {
            fields.remove(key);
        }
        None => log::debug!("Keeping non-text {} value as is", key),
    }
    found
}

fn take_texts(fields: &mut Map<String, Value>, key: &str) -> Option<OneOrMany<String>> {
    let found = match fields.get(key)? {
        Value::Array(items) => Some(OneOrMany::Many(items.iter().filter_map(text).collect())),
        value => text(value).map(OneOrMany::One),
    };
    if found.is_some() {
        fields.remove(key);
    }
    found
}

fn take_people(fields: &mut Map<String, Value>, key: &str) -> Option<OneOrMany<Person>> {
    Some(match fields.remove(key)? {
        Value::Array(items) => OneOrMany::Many(items.into_iter().map(Person::from_value).collect()),
        single => OneOrMany::One(Person::from_value(single)),
    })
}

fn take_named(fields: &mut Map<String, Value>, key: &str) -> Option<Named> {
    fn named(value: Value) -> Option<Named> {
        match value {
            Value::Object(mut entity) => Some(Named::Entity {
                name: take_text(&mut entity, "name"),
                other: entity,
            }),
            Value::Array(items) => items.into_iter().find_map(named),
            other => text(&other).map(Named::Text),
        }
    }
    let value = fields.remove(key)?;
    let found = named(value.clone());
    if found.is_none() {
        fields.insert(key.to_string(), value);
    }
    found
}

impl CreativeWork {
    /// Parses the assertion payload, logging and dropping it if it is malformed.
    pub fn from_assertion(data: &Value) -> Option<Self> {
        match serde_json::from_value(data.clone()) {
            Ok(work) => Some(work),
            Err(e) => {
                log::warn!("Malformed CreativeWork assertion: {}", e);
                None
            }
        }
    }

    pub fn creator(&self) -> Option<&str> {
        self.author.as_ref()?.first()?.name.as_deref()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignatureInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BasicInfo {
    pub title: Option<String>,
    pub format: Option<String>,
    pub instance_id: Option<String>,
    pub claim_generator: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Assertion {
    pub label: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SoftwareAgent {
    Name(String),
    Info {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
}

impl fmt::Display for SoftwareAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftwareAgent::Name(name) => write!(f, "{}", name),
            SoftwareAgent::Info { name, version: Some(v) } => write!(f, "{} {}", name, v),
            SoftwareAgent::Info { name, version: None } => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub action: String,
    #[serde(default)]
    pub when: Option<String>,
    #[serde(rename = "softwareAgent", default)]
    pub software_agent: Option<SoftwareAgent>,
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IngredientSummary {
    pub title: Option<String>,
    pub format: Option<String>,
    pub relationship: Option<String>,
    pub instance_id: Option<String>,
}

/// The provenance backend's verdict on the manifest signature.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// Valid and chained to a configured trust anchor.
    Trusted,
    Valid,
    Invalid,
    /// The backend does not validate signatures.
    NotVerified,
}

impl Verification {
    pub fn label(self) -> &'static str {
        match self {
            Verification::Trusted | Verification::Valid => "Signature Valid",
            Verification::Invalid => "Signature Invalid",
            Verification::NotVerified => "Signature Not Verified",
        }
    }

    pub fn is_verified(self) -> bool {
        matches!(self, Verification::Trusted | Verification::Valid)
    }
}

/// Everything read from the active manifest.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct C2paData {
    pub basic_info: BasicInfo,
    pub signature_info: Option<SignatureInfo>,
    pub assertions: Vec<Assertion>,
    pub ingredients: Vec<IngredientSummary>,
    pub actions: Vec<Action>,
    pub author_info: Option<CreativeWork>,
    pub verification: Verification,
}

impl C2paData {
    /// Pulls actions and creative work out of the assertion list.
    pub fn from_parts(
        basic_info: BasicInfo,
        signature_info: Option<SignatureInfo>,
        assertions: Vec<Assertion>,
        ingredients: Vec<IngredientSummary>,
        verification: Verification,
    ) -> Self {
        let mut actions = Vec::new();
        let mut author_info = None;
        for assertion in &assertions {
            match assertion.label.as_str() {
                ACTIONS_LABEL => actions.extend(parse_actions(&assertion.data)),
                CREATIVE_WORK_LABEL => author_info = CreativeWork::from_assertion(&assertion.data),
                _ => {}
            }
        }
        Self {
            basic_info,
            signature_info,
            assertions,
            ingredients,
            actions,
            author_info,
            verification,
        }
    }
}

fn parse_actions(data: &Value) -> Vec<Action> {
    let Some(list) = data.get("actions").and_then(Value::as_array) else {
        return Vec::new();
    };
    list.iter()
        .filter_map(|a| match serde_json::from_value::<Action>(a.clone()) {
            Ok(action) => Some(action),
            Err(e) => {
                log::warn!("Skipping malformed action: {}", e);
                None
            }
        })
        .collect()
}

/// The subset of a manifest the hover summary needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimalC2pa {
    pub signature_info: Option<SignatureInfo>,
    pub author_info: Option<CreativeWork>,
    pub verification: Verification,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuthorDetails {
    pub name: String,
    pub identifier: Option<Value>,
    pub url: Option<String>,
    #[serde(rename = "sameAs")]
    pub same_as: Vec<String>,
    pub email: Option<String>,
    pub telephone: Option<String>,
    pub address: Option<Value>,
    #[serde(rename = "jobTitle")]
    pub job_title: Option<String>,
    #[serde(rename = "worksFor")]
    pub works_for: Option<String>,
}

impl From<&Person> for AuthorDetails {
    fn from(person: &Person) -> Self {
        Self {
            name: person.name.clone().unwrap_or_else(|| "Unknown".to_string()),
            identifier: person.identifier.clone(),
            url: person.url.clone(),
            same_as: person
                .same_as
                .as_ref()
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default(),
            email: person.email.clone(),
            telephone: person.telephone.clone(),
            address: person.address.clone(),
            job_title: person.job_title.clone(),
            works_for: person.works_for.as_ref().and_then(|w| w.name()).map(str::to_string),
        }
    }
}

/// One row of the provenance panel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "name")]
pub enum ProvenanceItem {
    #[serde(rename = "Claim Generator")]
    ClaimGenerator { generator: String },
    #[serde(rename = "Issued By")]
    IssuedBy { issuer: String },
    #[serde(rename = "Issued On")]
    IssuedOn { date: String },
    Title { title: String },
    Description { data: String },
    Keywords { data: String },
    Author {
        author: String,
        author_details: AuthorDetails,
    },
    Copyright { copyright: String },
    Publisher { publisher: String },
    Action {
        action: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        when: Option<String>,
        software: Option<String>,
        parameters: Value,
    },
    Verification { verification: String },
}

pub fn format_provenance(data: &C2paData, zone: Zone) -> Vec<ProvenanceItem> {
    let mut items = Vec::new();

    if let Some(generator) = data.basic_info.claim_generator.as_deref().filter(|g| !g.is_empty()) {
        items.push(ProvenanceItem::ClaimGenerator {
            generator: format_claim_generator(generator),
        });
    }

    let signature = data.signature_info.as_ref();
    if let Some(issuer) = signature.and_then(|s| s.issuer.clone()) {
        items.push(ProvenanceItem::IssuedBy { issuer });
    }

    if let Some(time) = signature.and_then(|s| s.time.as_deref()) {
        items.push(ProvenanceItem::IssuedOn {
            date: format_datetime_full(time, zone),
        });
        if let Some(work) = &data.author_info {
            push_creative_work(&mut items, work);
        }
    }

    for action in &data.actions {
        items.push(ProvenanceItem::Action {
            action: action.action.clone(),
            when: action.when.as_deref().map(|w| format_datetime_full(w, zone)),
            software: action.software_agent.as_ref().map(|s| s.to_string()),
            parameters: action.parameters.clone(),
        });
    }

    if signature.is_some() {
        items.push(ProvenanceItem::Verification {
            verification: data.verification.label().to_string(),
        });
    }

    items
}

fn push_creative_work(items: &mut Vec<ProvenanceItem>, work: &CreativeWork) {
    if let Some(title) = &work.name {
        items.push(ProvenanceItem::Title { title: title.clone() });
    }
    if let Some(description) = &work.description {
        items.push(ProvenanceItem::Description {
            data: description.clone(),
        });
    }
    if let Some(keywords) = &work.keywords {
        let joined: Vec<&str> = keywords.iter().map(String::as_str).collect();
        items.push(ProvenanceItem::Keywords {
            data: joined.join(", "),
        });
    }
    if let Some(author) = work.author.as_ref().and_then(OneOrMany::first) {
        let details = AuthorDetails::from(author);
        items.push(ProvenanceItem::Author {
            author: details.name.clone(),
            author_details: details,
        });
    }
    if let Some(holder) = work.copyright_holder.as_ref().and_then(OneOrMany::first) {
        items.push(ProvenanceItem::Copyright {
            copyright: holder.name.clone().unwrap_or_else(|| "Unknown".to_string()),
        });
    }
    if let Some(publisher) = &work.publisher {
        items.push(ProvenanceItem::Publisher {
            publisher: publisher.name().unwrap_or("Unknown").to_string(),
        });
    }
}

/// Builds the hover summary; `None` means the image carries no manifest.
pub fn summarize(minimal: Option<&MinimalC2pa>, more: String) -> MiniResponse {
    let Some(minimal) = minimal else {
        return unverified(more);
    };
    let signature = minimal.signature_info.as_ref();
    MiniResponse {
        creator: minimal
            .author_info
            .as_ref()
            .and_then(CreativeWork::creator)
            .map(str::to_string),
        issued_by: signature.and_then(|s| s.issuer.clone()),
        issued_on: signature
            .and_then(|s| s.time.as_deref())
            .map(|t| format_datetime_full(t, Zone::Local)),
        status: if minimal.verification.is_verified() {
            "Authenticity Verified".to_string()
        } else {
            "Unverified".to_string()
        },
        more,
    }
}

pub fn unverified(more: String) -> MiniResponse {
    MiniResponse {
        creator: None,
        issued_by: None,
        issued_on: None,
        status: "Unverified".to_string(),
        more,
    }
}
