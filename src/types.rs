use serde::{Deserialize, Serialize};
use std::fmt;

/// Asset kinds exposed by the API. Each noun maps statically to a model,
/// a repository and a validation ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Noun {
    Breeder,
    Dog,
    Litter,
    Image,
}

impl Noun {
    pub fn as_str(&self) -> &'static str {
        match self {
            Noun::Breeder => "breeder",
            Noun::Dog => "dog",
            Noun::Litter => "litter",
            Noun::Image => "image",
        }
    }

    /// Collection segment used in routes and as the table name
    pub fn plural(&self) -> &'static str {
        match self {
            Noun::Breeder => "breeders",
            Noun::Dog => "dogs",
            Noun::Litter => "litters",
            Noun::Image => "images",
        }
    }
}

impl fmt::Display for Noun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
