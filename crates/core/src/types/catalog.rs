//! Menu categories for restaurant dishes.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Error returned for a category outside the fixed menu set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown dish category: {0}")]
pub struct DishCategoryError(pub String);

/// The fixed set of menu sections a dish can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DishCategory {
    #[default]
    Platos,
    Entradas,
    Bebidas,
    Postres,
    Especiales,
    Combos,
    Vegano,
}

impl DishCategory {
    /// Every category, in menu order.
    pub const ALL: [Self; 7] = [
        Self::Platos,
        Self::Entradas,
        Self::Bebidas,
        Self::Postres,
        Self::Especiales,
        Self::Combos,
        Self::Vegano,
    ];

    /// Stored value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Platos => "platos",
            Self::Entradas => "entradas",
            Self::Bebidas => "bebidas",
            Self::Postres => "postres",
            Self::Especiales => "especiales",
            Self::Combos => "combos",
            Self::Vegano => "vegano",
        }
    }

    /// Human-readable menu heading.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Platos => "Platos",
            Self::Entradas => "Entradas",
            Self::Bebidas => "Bebidas",
            Self::Postres => "Postres",
            Self::Especiales => "Especiales del Día",
            Self::Combos => "Combos Familiares",
            Self::Vegano => "Vegano",
        }
    }
}

impl std::str::FromStr for DishCategory {
    type Err = DishCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| DishCategoryError(s.to_owned()))
    }
}

impl fmt::Display for DishCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
