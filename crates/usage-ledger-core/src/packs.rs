//! Emission pack catalog.
//!
//! A pack maps a public identifier (`emissionPack5`) to a fixed number of
//! emissions and the payment-provider price that is invoiced for it.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// A purchasable bundle of emissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPack {
    /// Public pack identifier.
    pub id: String,
    /// Emissions granted when the invoice is paid.
    pub emissions: i64,
    /// Payment-provider price identifier.
    pub price_id: String,
}

/// The set of packs that can be purchased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionPackCatalog {
    packs: Vec<EmissionPack>,
}

impl Default for EmissionPackCatalog {
    fn default() -> Self {
        Self {
            packs: vec![
                EmissionPack {
                    id: "emissionPack1".into(),
                    emissions: 1,
                    price_id: "price_emission_pack_1".into(),
                },
                EmissionPack {
                    id: "emissionPack5".into(),
                    emissions: 5,
                    price_id: "price_emission_pack_5".into(),
                },
                EmissionPack {
                    id: "emissionPack10".into(),
                    emissions: 10,
                    price_id: "price_emission_pack_10".into(),
                },
            ],
        }
    }
}

impl EmissionPackCatalog {
    /// Look up a pack by identifier.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownPack` if the identifier is not in the catalog.
    pub fn get(&self, pack_id: &str) -> Result<&EmissionPack> {
        self.packs
            .iter()
            .find(|p| p.id == pack_id)
            .ok_or_else(|| LedgerError::UnknownPack {
                pack_id: pack_id.to_string(),
            })
    }

    /// Replace the price of a pack. Unknown pack ids are ignored and reported as `false`.
    pub fn set_price(&mut self, pack_id: &str, price_id: impl Into<String>) -> bool {
        match self.packs.iter_mut().find(|p| p.id == pack_id) {
            Some(pack) => {
                pack.price_id = price_id.into();
                true
            }
            None => false,
        }
    }

    /// Iterate over all packs.
    pub fn iter(&self) -> impl Iterator<Item = &EmissionPack> {
        self.packs.iter()
    }
}
