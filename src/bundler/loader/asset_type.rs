//! Asset kinds, derived from file suffixes.

use serde::{Deserialize, Serialize};

/// Kind of asset a bundle target holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetType {
    /// Unknown suffix; only exact lookups apply.
    #[default]
    None,
    Scene,
    Prefab,
    Audio,
    Material,
    Texture,
    SpriteAtlas,
    /// Generic serialized asset (`.asset`).
    Asset,
    Text,
    Json,
}

impl AssetType {
    /// Every typed (non-`None`) variant.
    pub const TYPED: [AssetType; 9] = [
        AssetType::Scene,
        AssetType::Prefab,
        AssetType::Audio,
        AssetType::Material,
        AssetType::Texture,
        AssetType::SpriteAtlas,
        AssetType::Asset,
        AssetType::Text,
        AssetType::Json,
    ];

    /// File suffixes of this type, dot included.
    pub fn suffixes(&self) -> &'static [&'static str] {
        match self {
            AssetType::None => &[],
            AssetType::Scene => &[".unity"],
            AssetType::Prefab => &[".prefab"],
            AssetType::Audio => &[".wav", ".mp3"],
            AssetType::Material => &[".mat"],
            AssetType::Texture => &[".png", ".jpg", ".tga"],
            AssetType::SpriteAtlas => &[".spriteatlas"],
            AssetType::Asset => &[".asset"],
            AssetType::Text => &[".txt"],
            AssetType::Json => &[".json"],
        }
    }

    /// Type of the file at `path`, by suffix (case-insensitive).
    pub fn from_path(path: &str) -> AssetType {
        let lower = path.to_ascii_lowercase();
        Self::TYPED
            .into_iter()
            .find(|ty| ty.suffixes().iter().any(|s| lower.ends_with(s)))
            .unwrap_or(AssetType::None)
    }
}
