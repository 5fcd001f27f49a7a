//! SMSCB message model.
//!
//! A broadcast message is either a CBS message (data coding scheme plus up to
//! 15 pages of user data) or an ETWS warning (warning type plus security
//! info). The two are a sum type: every consumer matches on [`SmscbPayload`]
//! and never reads one variant's fields as the other's.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single SMSCB page of 82 user bytes (excluding any GSM specific header).
pub const SMSCB_RAW_PAGE_LEN: usize = 82;
pub const SMSCB_MAX_NUM_PAGES: usize = 15;
/// Warning-Security-Information length as per 3GPP TS 23.041 9.3.25.
pub const ETWS_SEC_INFO_LEN: usize = 50;
/// Repetition period limits, in units of 1.883 s.
pub const REP_PERIOD_MIN: u16 = 1;
pub const REP_PERIOD_MAX: u16 = 4095;

// ── Category ──────────────────────────────────────────────────────────────────

/// Broadcast category (CBSP "Category" IE).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    HighPriority,
    #[default]
    Normal,
    Background,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::HighPriority => "high_priority",
            Category::Normal => "normal",
            Category::Background => "background",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_priority" => Ok(Category::HighPriority),
            "normal" => Ok(Category::Normal),
            "background" => Ok(Category::Background),
            other => Err(MessageError::UnknownCategory(other.to_string())),
        }
    }
}

// ── Scope ─────────────────────────────────────────────────────────────────────

/// Where a message is broadcast. Only PLMN-wide is supported; every peer is in
/// scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    Plmn,
}

/// Geographical scope, the top two bits of the serial number
/// (3GPP TS 23.041 9.4.1.2.1 "GS Code").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoScope {
    CellWideImmediate = 0,
    PlmnWide = 1,
    LacSacTacWide = 2,
    CellWide = 3,
}

impl FromStr for GeoScope {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cell_wide_immediate" => Ok(GeoScope::CellWideImmediate),
            "plmn_wide" => Ok(GeoScope::PlmnWide),
            "lac_sac_tac_wide" => Ok(GeoScope::LacSacTacWide),
            "cell_wide" => Ok(GeoScope::CellWide),
            other => Err(MessageError::UnknownGeoScope(other.to_string())),
        }
    }
}

/// Build a serial number from its decoded parts: GS (2 bits), message code
/// (10 bits), update number (4 bits).
pub fn encode_serial_nr(
    geo_scope: GeoScope,
    msg_code: u16,
    update_nr: u8,
) -> Result<u16, MessageError> {
    if msg_code > 0x3ff {
        return Err(MessageError::MsgCodeOutOfRange(msg_code));
    }
    if update_nr > 0xf {
        return Err(MessageError::UpdateNrOutOfRange(update_nr));
    }
    Ok(((geo_scope as u16) << 14) | (msg_code << 4) | update_nr as u16)
}

/// ETWS warning type names as per 3GPP TS 23.041 9.3.24.
pub fn warning_type_from_name(name: &str) -> Option<u16> {
    match name {
        "earthquake" => Some(0),
        "tsunami" => Some(1),
        // "tsuname" is a spelling some CBEs send
        "earthquake_and_tsunami" | "earthquake_and_tsuname" => Some(2),
        "test" => Some(3),
        "other" => Some(4),
        _ => None,
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbsPayload {
    /// Data coding scheme (3GPP TS 23.038 section 5).
    pub dcs: u8,
    /// Page data, one entry per page, each at most [`SMSCB_RAW_PAGE_LEN`] bytes.
    pub pages: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtwsPayload {
    pub warning_type: u16,
    /// At most [`ETWS_SEC_INFO_LEN`] bytes. Empty when not supplied.
    pub warning_sec_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmscbPayload {
    Cbs(CbsPayload),
    Etws(EtwsPayload),
}

/// A plain SMSCB message without broadcast metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmscbMessage {
    pub message_id: u16,
    pub serial_nr: u16,
    pub payload: SmscbPayload,
}

impl SmscbMessage {
    pub fn is_etws(&self) -> bool {
        matches!(self.payload, SmscbPayload::Etws(_))
    }
}

// ── CBC message ───────────────────────────────────────────────────────────────

/// A broadcast request as held in the message registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CbcMessage {
    /// Name of the CBE originating this message.
    pub cbe_name: String,
    pub category: Category,
    /// Repetition period, [`REP_PERIOD_MIN`]..=[`REP_PERIOD_MAX`].
    pub rep_period: u16,
    /// Basic (false) or extended (true) CBCH.
    pub extended_cbch: bool,
    /// Warning period in seconds. `None` = unlimited.
    pub warning_period_sec: Option<u32>,
    /// Number of broadcasts requested. 0 = unlimited.
    pub num_bcast: u16,
    pub scope: Scope,
    pub msg: SmscbMessage,
}

impl CbcMessage {
    pub fn message_id(&self) -> u16 {
        self.msg.message_id
    }

    pub fn serial_nr(&self) -> u16 {
        self.msg.serial_nr
    }

    pub fn is_etws(&self) -> bool {
        self.msg.is_etws()
    }

    /// Check the structural limits a RAN peer would reject.
    pub fn validate(&self) -> Result<(), MessageError> {
        if self.cbe_name.is_empty() {
            return Err(MessageError::EmptyCbeName);
        }
        if !(REP_PERIOD_MIN..=REP_PERIOD_MAX).contains(&self.rep_period) {
            return Err(MessageError::RepPeriodOutOfRange(self.rep_period));
        }
        match &self.msg.payload {
            SmscbPayload::Cbs(cbs) => {
                if cbs.pages.is_empty() {
                    return Err(MessageError::NoPages);
                }
                if cbs.pages.len() > SMSCB_MAX_NUM_PAGES {
                    return Err(MessageError::TooManyPages(cbs.pages.len()));
                }
                if let Some((page, data)) = cbs
                    .pages
                    .iter()
                    .enumerate()
                    .find(|(_, p)| p.len() > SMSCB_RAW_PAGE_LEN)
                {
                    return Err(MessageError::PageTooLong {
                        page,
                        len: data.len(),
                    });
                }
            }
            SmscbPayload::Etws(etws) => {
                if etws.warning_sec_info.len() > ETWS_SEC_INFO_LEN {
                    return Err(MessageError::SecInfoTooLong(etws.warning_sec_info.len()));
                }
            }
        }
        Ok(())
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("cbe_name must not be empty")]
    EmptyCbeName,
    #[error("repetition period {0} outside 1..=4095")]
    RepPeriodOutOfRange(u16),
    #[error("CBS message has no pages")]
    NoPages,
    #[error("CBS message has {0} pages, at most 15 allowed")]
    TooManyPages(usize),
    #[error("page {page} is {len} bytes, at most 82 allowed")]
    PageTooLong { page: usize, len: usize },
    #[error("warning security info is {0} bytes, at most 50 allowed")]
    SecInfoTooLong(usize),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("unknown geographic scope '{0}'")]
    UnknownGeoScope(String),
    #[error("message code {0} outside 0..=1023")]
    MsgCodeOutOfRange(u16),
    #[error("update number {0} outside 0..=15")]
    UpdateNrOutOfRange(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cbs_message(pages: Vec<Vec<u8>>) -> CbcMessage {
        CbcMessage {
            cbe_name: "cbe".into(),
            category: Category::Normal,
            rep_period: 4,
            extended_cbch: false,
            warning_period_sec: None,
            num_bcast: 0,
            scope: Scope::Plmn,
            msg: SmscbMessage {
                message_id: 0x10,
                serial_nr: 0x20,
                payload: SmscbPayload::Cbs(CbsPayload { dcs: 0x0f, pages }),
            },
        }
    }

    #[test]
    fn serial_nr_packs_fields() {
        let sn = encode_serial_nr(GeoScope::PlmnWide, 0x123, 5).unwrap();
        assert_eq!(sn, (1 << 14) | (0x123 << 4) | 5);
        assert_eq!(sn >> 14, 1);
    }

    #[test]
    fn serial_nr_rejects_out_of_range_parts() {
        assert_eq!(
            encode_serial_nr(GeoScope::CellWide, 1024, 0),
            Err(MessageError::MsgCodeOutOfRange(1024))
        );
        assert_eq!(
            encode_serial_nr(GeoScope::CellWide, 0, 16),
            Err(MessageError::UpdateNrOutOfRange(16))
        );
    }

    #[test]
    fn category_parses_known_names() {
        assert_eq!("high_priority".parse::<Category>().unwrap(), Category::HighPriority);
        assert_eq!("background".parse::<Category>().unwrap(), Category::Background);
        assert!("urgent".parse::<Category>().is_err());
        assert_eq!(Category::default(), Category::Normal);
    }

    #[test]
    fn validate_accepts_well_formed_cbs() {
        assert!(cbs_message(vec![vec![0u8; 82]]).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_pages() {
        assert_eq!(cbs_message(vec![]).validate(), Err(MessageError::NoPages));
        assert_eq!(
            cbs_message(vec![vec![0u8; 10]; 16]).validate(),
            Err(MessageError::TooManyPages(16))
        );
        assert_eq!(
            cbs_message(vec![vec![0u8; 10], vec![0u8; 83]]).validate(),
            Err(MessageError::PageTooLong { page: 1, len: 83 })
        );
    }

    #[test]
    fn validate_rejects_rep_period_zero() {
        let mut msg = cbs_message(vec![vec![1]]);
        msg.rep_period = 0;
        assert_eq!(msg.validate(), Err(MessageError::RepPeriodOutOfRange(0)));
    }

    #[test]
    fn etws_is_distinguished_from_cbs() {
        let mut msg = cbs_message(vec![vec![1]]);
        assert!(!msg.is_etws());
        msg.msg.payload = SmscbPayload::Etws(EtwsPayload {
            warning_type: warning_type_from_name("tsunami").unwrap(),
            warning_sec_info: vec![0u8; 51],
        });
        assert!(msg.is_etws());
        assert_eq!(msg.validate(), Err(MessageError::SecInfoTooLong(51)));
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let payload = SmscbPayload::Etws(EtwsPayload {
            warning_type: 1,
            warning_sec_info: vec![],
        });
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "etws");
        assert_eq!(value["warning_type"], 1);
        let back: SmscbPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }
}
