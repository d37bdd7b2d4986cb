//! ERC-721 style metadata document served for each passport.

use serde::{Deserialize, Serialize};

use crate::blockchain::calldata::TokenId;
use crate::config::MetadataConfig;

const DESCRIPTION: &str = "Digital Product Passport - Verify authenticity on Starknet blockchain";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub trait_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
    pub external_url: String,
    pub attributes: Vec<MetadataAttribute>,
}

impl PassportMetadata {
    pub fn for_token(token_id: TokenId, config: &MetadataConfig) -> Self {
        let attribute = |trait_type: &str, value: &str| MetadataAttribute {
            trait_type: trait_type.to_string(),
            value: value.to_string(),
        };

        Self {
            name: format!("{} #{}", config.collection_name, token_id),
            description: DESCRIPTION.to_string(),
            image: config.image_url.clone(),
            external_url: format!("{}/{}", config.verify_base_url.trim_end_matches('/'), token_id),
            attributes: vec![
                attribute("Status", "Active"),
                attribute("Network", "Starknet"),
                attribute("Type", "Product Passport"),
            ],
        }
    }
}
