//! ECBE JSON request model (`POST /message`) and its conversion into a
//! [`CbcMessage`].
//!
//! Alternatives such as encoded vs. decoded serial numbers are externally
//! tagged objects, e.g. `{"serial_nr_encoded": 4660}` or
//! `{"serial_nr_decoded": {"geo_scope": "plmn_wide", "msg_code": 1, "update_nr": 0}}`.

use serde::Deserialize;

use cbc_core::charset::{self, CharsetError};
use cbc_core::message::{encode_serial_nr, warning_type_from_name};
use cbc_core::{
    CbcMessage, Category, CbsPayload, EtwsPayload, GeoScope, MessageError, Scope, SmscbMessage,
    SmscbPayload,
};

#[derive(Debug, thiserror::Error)]
pub enum EcbeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid hex in {field}: {source}")]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[error(transparent)]
    Charset(#[from] CharsetError),
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error("language '{0}' is not an ISO 639-1 code")]
    Language(String),
    #[error("dcs_class {0} outside 0..=3")]
    DcsClass(u8),
    #[error("unknown warning type '{0}'")]
    WarningType(String),
}

#[derive(Debug, Deserialize)]
pub struct EcbeMessage {
    pub cbe_name: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub repetition_period: Option<u16>,
    #[serde(default)]
    pub number_of_broadcasts: Option<u16>,
    #[serde(default)]
    pub warning_period_sec: Option<u16>,
    #[serde(default)]
    pub extended_cbch: Option<bool>,
    pub scope: EcbeScope,
    pub smscb_message: EcbeSmscb,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcbeScope {
    ScopePlmn {},
}

#[derive(Debug, Deserialize)]
pub struct EcbeSmscb {
    pub message_id: u16,
    pub serial_nr: EcbeSerialNr,
    pub payload: EcbePayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcbeSerialNr {
    SerialNrEncoded(u16),
    SerialNrDecoded {
        geo_scope: GeoScope,
        msg_code: u16,
        update_nr: u8,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcbePayload {
    PayloadEncoded {
        dcs: u8,
        /// Hex strings, one per page.
        pages: Vec<String>,
    },
    PayloadDecoded {
        character_set: CharacterSet,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        dcs_class: Option<u8>,
        /// UTF-8 text, or hex for the 8-bit character set.
        data_utf8: String,
    },
    PayloadEtws {
        warning_type: EcbeWarningType,
        #[serde(default)]
        warning_sec_info: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterSet {
    Gsm,
    #[serde(rename = "8bit")]
    EightBit,
    Ucs2,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EcbeWarningType {
    WarningTypeEncoded(u16),
    WarningTypeDecoded(String),
}

/// CBS DCS language groups for 7-bit text, 3GPP TS 23.038 section 5.
const ISO639_1_CBS_DCS: [(&str, u8); 20] = [
    ("de", 0x00),
    ("en", 0x01),
    ("it", 0x02),
    ("fr", 0x03),
    ("es", 0x04),
    ("nl", 0x05),
    ("sv", 0x06),
    ("da", 0x07),
    ("pt", 0x08),
    ("fi", 0x09),
    ("no", 0x0a),
    ("el", 0x0b),
    ("tr", 0x0c),
    ("hu", 0x0d),
    ("pl", 0x0e),
    ("cs", 0x20),
    ("he", 0x21),
    ("ar", 0x22),
    ("ru", 0x23),
    ("is", 0x24),
];

fn language_dcs(language: &str) -> Option<u8> {
    ISO639_1_CBS_DCS
        .iter()
        .find(|(code, _)| *code == language)
        .map(|&(_, dcs)| dcs)
}

fn parse_hex(field: &'static str, s: &str) -> Result<Vec<u8>, EcbeError> {
    hex::decode(s).map_err(|source| EcbeError::Hex { field, source })
}

impl EcbeMessage {
    pub fn from_json(value: serde_json::Value) -> Result<Self, EcbeError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn into_message(self) -> Result<CbcMessage, EcbeError> {
        let serial_nr = match self.smscb_message.serial_nr {
            EcbeSerialNr::SerialNrEncoded(sn) => sn,
            EcbeSerialNr::SerialNrDecoded {
                geo_scope,
                msg_code,
                update_nr,
            } => encode_serial_nr(geo_scope, msg_code, update_nr)?,
        };
        let payload = self.smscb_message.payload.into_payload()?;
        let message = CbcMessage {
            cbe_name: self.cbe_name,
            category: self.category.unwrap_or_default(),
            rep_period: self.repetition_period.unwrap_or(1),
            extended_cbch: self.extended_cbch.unwrap_or(false),
            warning_period_sec: self.warning_period_sec.map(u32::from),
            num_bcast: self.number_of_broadcasts.unwrap_or(0),
            scope: match self.scope {
                EcbeScope::ScopePlmn {} => Scope::Plmn,
            },
            msg: SmscbMessage {
                message_id: self.smscb_message.message_id,
                serial_nr,
                payload,
            },
        };
        message.validate()?;
        Ok(message)
    }
}

impl EcbePayload {
    fn into_payload(self) -> Result<SmscbPayload, EcbeError> {
        match self {
            EcbePayload::PayloadEncoded { dcs, pages } => {
                let pages = pages
                    .iter()
                    .map(|p| parse_hex("pages", p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SmscbPayload::Cbs(CbsPayload { dcs, pages }))
            }
            EcbePayload::PayloadDecoded {
                character_set,
                language,
                dcs_class,
                data_utf8,
            } => {
                if let Some(class) = dcs_class.filter(|c| *c > 3) {
                    return Err(EcbeError::DcsClass(class));
                }
                if let Some(lang) = language.as_deref().filter(|l| l.len() > 2) {
                    return Err(EcbeError::Language(lang.to_string()));
                }
                let (dcs, pages) = match character_set {
                    CharacterSet::Gsm => {
                        let dcs = match (language.as_deref().and_then(language_dcs), dcs_class) {
                            (Some(lang_dcs), _) => lang_dcs,
                            (None, Some(class)) => 0xf0 | class,
                            (None, None) => 0x0f,
                        };
                        (dcs, charset::encode_gsm7_pages(&data_utf8)?)
                    }
                    CharacterSet::EightBit => {
                        let data = parse_hex("data_utf8", &data_utf8)?;
                        (0xf4 | dcs_class.unwrap_or(0), charset::split_8bit_pages(&data)?)
                    }
                    CharacterSet::Ucs2 => {
                        let dcs = match dcs_class {
                            Some(class) => 0x58 | class,
                            None => 0x48,
                        };
                        (dcs, charset::encode_ucs2_pages(&data_utf8)?)
                    }
                };
                Ok(SmscbPayload::Cbs(CbsPayload { dcs, pages }))
            }
            EcbePayload::PayloadEtws {
                warning_type,
                warning_sec_info,
            } => {
                let warning_type = match warning_type {
                    EcbeWarningType::WarningTypeEncoded(t) => t,
                    EcbeWarningType::WarningTypeDecoded(name) => {
                        warning_type_from_name(&name).ok_or(EcbeError::WarningType(name))?
                    }
                };
                let warning_sec_info = match warning_sec_info {
                    Some(s) => parse_hex("warning_sec_info", &s)?,
                    None => Vec::new(),
                };
                Ok(SmscbPayload::Etws(EtwsPayload {
                    warning_type,
                    warning_sec_info,
                }))
            }
        }
    }
}
