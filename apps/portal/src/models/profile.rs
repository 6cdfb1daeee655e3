use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::models::identity::{DisplayInfo, Identity};
use crate::plans::Tier;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub date: String,
}

/// The application's user record as stored by the backend, keyed by `uid`.
/// Fields the client does not model are kept in `extra` so the cached copy
/// always matches what the server sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,

    // Personal
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub cover_photo: Option<String>,

    // Professional
    pub profession: Option<String>,
    pub user_type: Option<String>,
    pub current_position: Option<String>,
    pub company: Option<String>,
    pub industry: Option<String>,
    pub years_of_experience: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub skills: Vec<String>,
    pub resume: Option<String>,
    pub cover_letter: Option<String>,

    // Education
    pub highest_degree: Option<String>,
    pub institution: Option<String>,
    pub field_of_study: Option<String>,
    pub graduation_year: Option<String>,
    pub gpa: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub certifications: Vec<Certification>,

    // Preferences
    #[serde(deserialize_with = "null_as_empty")]
    pub job_types: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub preferred_locations: Vec<String>,
    pub remote_preference: Option<String>,
    pub salary_expectation: Option<String>,
    pub notice_period: Option<String>,
    pub visibility: Option<String>,

    // Social
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub portfolio: Option<String>,
    pub twitter: Option<String>,

    // Subscription
    #[serde(rename = "package")]
    pub tier: Option<Tier>,
    pub package_expiry: Option<DateTime<Utc>>,

    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The backend stores list fields as `null` until they are first edited.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Profile {
    pub fn tier(&self) -> Tier {
        self.tier.unwrap_or_default()
    }
}

/// Extra sign-up form fields used to seed the first profile write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSeed {
    pub full_name: Option<String>,
    pub photo_url: Option<String>,
    pub location: Option<String>,
    pub profession: Option<String>,
    pub user_type: Option<String>,
    pub tier: Option<Tier>,
}

impl ProfileSeed {
    pub fn with_full_name(name: impl Into<String>) -> Self {
        Self {
            full_name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Provider-side display info carried by this seed.
    pub fn display_info(&self) -> DisplayInfo {
        DisplayInfo {
            display_name: self.full_name.clone(),
            photo_url: self.photo_url.clone(),
        }
    }
}

/// Body of `POST /api/users`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,
    #[serde(rename = "package")]
    pub tier: Tier,
    pub package_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewProfile {
    /// Record written right after an email sign-up.
    pub fn from_seed(identity: &Identity, seed: &ProfileSeed, now: DateTime<Utc>) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: seed.full_name.clone().unwrap_or_default(),
            photo_url: seed.photo_url.clone().unwrap_or_default(),
            location: Some(seed.location.clone().unwrap_or_default()),
            profession: Some(seed.profession.clone().unwrap_or_default()),
            user_type: Some(seed.user_type.clone().unwrap_or_default()),
            tier: seed.tier.unwrap_or_default(),
            package_expiry: None,
            created_at: now,
        }
    }

    /// Record written after an external-provider sign-in, taken from the identity alone.
    pub fn from_identity(identity: &Identity, now: DateTime<Utc>) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone().unwrap_or_default(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            photo_url: identity.photo_url.clone().unwrap_or_default(),
            location: None,
            profession: None,
            user_type: None,
            tier: Tier::Basic,
            package_expiry: None,
            created_at: now,
        }
    }
}

/// Partial profile update for `PUT /api/users/:uid`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_photo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub years_of_experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_letter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highest_degree: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_of_study: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certifications: Option<Vec<Certification>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_locations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_preference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_expectation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    /// Stamped by the session manager when the update is sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == ProfilePatch::default()
    }
}
