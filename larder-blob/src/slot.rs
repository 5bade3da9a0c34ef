use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::AssetError;

/// A named, singleton-per-site location for one category of asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlotKind {
    ProfileImage,
    Cv,
    Logo,
    Favicon,
    HeroBackground,
}

impl SlotKind {
    pub const COUNT: usize = 5;

    pub const ALL: [SlotKind; SlotKind::COUNT] = [
        SlotKind::ProfileImage,
        SlotKind::Cv,
        SlotKind::Logo,
        SlotKind::Favicon,
        SlotKind::HeroBackground,
    ];

    /// Kebab-case name used in URLs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::ProfileImage => "profile-image",
            SlotKind::Cv => "cv",
            SlotKind::Logo => "logo",
            SlotKind::Favicon => "favicon",
            SlotKind::HeroBackground => "hero-background",
        }
    }

    /// Snake-case name used in configuration keys.
    pub fn config_key(&self) -> &'static str {
        match self {
            SlotKind::ProfileImage => "profile_image",
            SlotKind::Cv => "cv",
            SlotKind::Logo => "logo",
            SlotKind::Favicon => "favicon",
            SlotKind::HeroBackground => "hero_background",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            SlotKind::ProfileImage => 0,
            SlotKind::Cv => 1,
            SlotKind::Logo => 2,
            SlotKind::Favicon => 3,
            SlotKind::HeroBackground => 4,
        }
    }

    /// The storage, naming and validation rules for this slot.
    pub fn policy(&self) -> SlotPolicy {
        match self {
            SlotKind::ProfileImage => SlotPolicy {
                backend: Backend::Remote,
                accept: PHOTO_TYPES,
                max_bytes: 5 * MIB,
            },
            SlotKind::Cv => SlotPolicy {
                backend: Backend::Local(LocalPlacement {
                    naming: NamingPolicy::Timestamped("cv"),
                    visibility: Visibility::Private,
                }),
                accept: DOCUMENT_TYPES,
                max_bytes: 10 * MIB,
            },
            SlotKind::Logo => SlotPolicy {
                backend: Backend::Local(LocalPlacement {
                    naming: NamingPolicy::Fixed("logo"),
                    visibility: Visibility::Public,
                }),
                accept: LOGO_TYPES,
                max_bytes: 2 * MIB,
            },
            SlotKind::Favicon => SlotPolicy {
                backend: Backend::Local(LocalPlacement {
                    naming: NamingPolicy::Fixed("favicon"),
                    visibility: Visibility::Public,
                }),
                accept: FAVICON_TYPES,
                max_bytes: MIB,
            },
            SlotKind::HeroBackground => SlotPolicy {
                backend: Backend::Local(LocalPlacement {
                    naming: NamingPolicy::Fixed("hero-background"),
                    visibility: Visibility::Public,
                }),
                accept: BACKGROUND_TYPES,
                max_bytes: 10 * MIB,
            },
        }
    }

    /// The fixed-name slot that owns a public file name, if any.
    pub fn for_public_file(file_name: &str) -> Option<SlotKind> {
        SlotKind::ALL.into_iter().find(|kind| {
            matches!(
                kind.policy().backend,
                Backend::Local(LocalPlacement {
                    naming: NamingPolicy::Fixed(name),
                    visibility: Visibility::Public,
                }) if name == file_name
            )
        })
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKind {
    type Err = AssetError;

    /// Accepts `hero-background`, `hero_background` and `heroBackground`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match folded.as_str() {
            "profileimage" => Ok(SlotKind::ProfileImage),
            "cv" => Ok(SlotKind::Cv),
            "logo" => Ok(SlotKind::Logo),
            "favicon" => Ok(SlotKind::Favicon),
            "herobackground" => Ok(SlotKind::HeroBackground),
            _ => Err(AssetError::UnknownSlot(s.to_string())),
        }
    }
}

const MIB: u64 = 1024 * 1024;

const PHOTO_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
const LOGO_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/svg+xml"];
const FAVICON_TYPES: &[&str] = &[
    "image/x-icon",
    "image/vnd.microsoft.icon",
    "image/png",
    "image/svg+xml",
];
const BACKGROUND_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
const DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Where a slot's bytes live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local(LocalPlacement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPlacement {
    pub naming: NamingPolicy,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    /// Always the same file name, so the public URL never changes.
    Fixed(&'static str),
    /// `<prefix>-<monotonic millis>.<ext>`
    Timestamped(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Served statically under `/uploads/`.
    Public,
    /// Reachable only through the token-gated download route.
    Private,
}

impl Visibility {
    pub fn dir(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

/// One row of the closed slot mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotPolicy {
    pub backend: Backend,
    pub accept: &'static [&'static str],
    /// Default ceiling; `AssetConfig` may override it.
    pub max_bytes: u64,
}

impl SlotPolicy {
    pub fn accepts(&self, mime_type: &str) -> bool {
        let normalized = normalize_mime(mime_type);
        self.accept.iter().any(|allowed| *allowed == normalized)
    }
}

/// Lowercase, drop parameters, fold common aliases.
pub fn normalize_mime(mime_type: &str) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/ico" => "image/x-icon".to_string(),
        _ => essence,
    }
}
