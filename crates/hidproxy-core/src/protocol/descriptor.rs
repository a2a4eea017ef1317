//! HID report descriptor parsing, just deep enough to route reports.
//!
//! # What is a report descriptor? (for beginners)
//!
//! A boot keyboard always sends the same eight-byte report, but a composite
//! device (a keyboard with media keys, a wireless receiver serving both
//! keyboard and mouse) describes its own report layouts with a *report
//! descriptor*: a byte-coded program of "items".  Each top-level
//! *application collection* is one logical device, identified by a usage page
//! and usage (Generic Desktop / Keyboard, Generic Desktop / Mouse, ...).  When
//! a descriptor declares more than one collection, every report starts with a
//! one-byte *report id* naming the collection it belongs to.
//!
//! This module extracts `(report id, usage page, usage)` for each top-level
//! collection and uses that table to pull keyboard or mouse sub-reports out
//! of raw reports.

use thiserror::Error;

use crate::domain::report::{KeyboardReport, MouseReport};

/// Most report-infos kept per interface.
pub const MAX_REPORT_INFOS: usize = 4;

/// Generic Desktop usage page.
pub const USAGE_PAGE_DESKTOP: u16 = 0x01;
/// Generic Desktop / Mouse.
pub const USAGE_MOUSE: u16 = 0x02;
/// Generic Desktop / Keyboard.
pub const USAGE_KEYBOARD: u16 = 0x06;

const ITEM_TYPE_MAIN: u8 = 0;
const ITEM_TYPE_GLOBAL: u8 = 1;
const ITEM_TYPE_LOCAL: u8 = 2;

const MAIN_INPUT: u8 = 0x8;
const MAIN_COLLECTION: u8 = 0xA;
const MAIN_END_COLLECTION: u8 = 0xC;

const GLOBAL_USAGE_PAGE: u8 = 0x0;
const GLOBAL_REPORT_SIZE: u8 = 0x7;
const GLOBAL_REPORT_ID: u8 = 0x8;
const GLOBAL_REPORT_COUNT: u8 = 0x9;
const GLOBAL_PUSH: u8 = 0xA;
const GLOBAL_POP: u8 = 0xB;

const LOCAL_USAGE: u8 = 0x0;

const COLLECTION_APPLICATION: u32 = 0x01;
const LONG_ITEM_PREFIX: u8 = 0xFE;

/// Errors raised while walking a report descriptor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// An item's declared data runs past the end of the descriptor.
    #[error("descriptor truncated in item at offset {offset}")]
    Truncated { offset: usize },

    /// More End Collection items than Collection items.
    #[error("unbalanced End Collection at offset {offset}")]
    UnbalancedCollection { offset: usize },
}

/// One top-level application collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReportInfo {
    /// 0 when the device does not use report ids.
    pub report_id: u8,
    pub usage_page: u16,
    pub usage: u16,
    /// Total size of the collection's input fields, in bits.
    pub input_bits: u32,
}

#[derive(Clone, Copy, Default)]
struct GlobalState {
    usage_page: u16,
    report_size: u32,
    report_count: u32,
    report_id: u8,
}

/// Parses `descriptor` into at most [`MAX_REPORT_INFOS`] report-infos.
/// Collections beyond that limit are ignored.
///
/// # Errors
///
/// Returns [`DescriptorError`] for truncated items or unbalanced collections.
pub fn parse_report_descriptor(descriptor: &[u8]) -> Result<Vec<ReportInfo>, DescriptorError> {
    let mut infos: Vec<ReportInfo> = Vec::new();
    let mut global = GlobalState::default();
    let mut stack: Vec<GlobalState> = Vec::new();
    // First usage since the last main item, with its item size.
    let mut usage: Option<(u32, usize)> = None;
    let mut depth: usize = 0;
    // Index into `infos` of the collection currently open at depth 1+.
    let mut current: Option<usize> = None;

    let mut offset = 0;
    while offset < descriptor.len() {
        let prefix = descriptor[offset];

        if prefix == LONG_ITEM_PREFIX {
            let size = *descriptor
                .get(offset + 1)
                .ok_or(DescriptorError::Truncated { offset })? as usize;
            offset += 3 + size;
            if offset > descriptor.len() {
                return Err(DescriptorError::Truncated { offset });
            }
            continue;
        }

        let size = match prefix & 0x03 {
            3 => 4,
            n => n as usize,
        };
        let item_type = (prefix >> 2) & 0x03;
        let tag = prefix >> 4;
        let data_start = offset + 1;
        let data = descriptor
            .get(data_start..data_start + size)
            .ok_or(DescriptorError::Truncated { offset })?;
        let value = data
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));

        match (item_type, tag) {
            (ITEM_TYPE_GLOBAL, GLOBAL_USAGE_PAGE) => global.usage_page = value as u16,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_SIZE) => global.report_size = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_COUNT) => global.report_count = value,
            (ITEM_TYPE_GLOBAL, GLOBAL_REPORT_ID) => {
                global.report_id = value as u8;
                if let Some(info) = current.and_then(|i| infos.get_mut(i)) {
                    if info.report_id == 0 {
                        info.report_id = global.report_id;
                    }
                }
            }
            (ITEM_TYPE_GLOBAL, GLOBAL_PUSH) => stack.push(global),
            (ITEM_TYPE_GLOBAL, GLOBAL_POP) => {
                if let Some(saved) = stack.pop() {
                    global = saved;
                }
            }
            (ITEM_TYPE_LOCAL, LOCAL_USAGE) => {
                if usage.is_none() {
                    usage = Some((value, size));
                }
            }
            (ITEM_TYPE_MAIN, MAIN_COLLECTION) => {
                if depth == 0 && value == COLLECTION_APPLICATION && infos.len() < MAX_REPORT_INFOS {
                    let (raw_usage, usage_size) = usage.unwrap_or((0, 0));
                    // A four-byte usage carries its own page in the high half.
                    let (page, id) = if usage_size == 4 {
                        ((raw_usage >> 16) as u16, raw_usage as u16)
                    } else {
                        (global.usage_page, raw_usage as u16)
                    };
                    // The collection's Report ID item follows inside it.
                    infos.push(ReportInfo {
                        report_id: 0,
                        usage_page: page,
                        usage: id,
                        input_bits: 0,
                    });
                    current = Some(infos.len() - 1);
                }
                depth += 1;
            }
            (ITEM_TYPE_MAIN, MAIN_END_COLLECTION) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(DescriptorError::UnbalancedCollection { offset })?;
                if depth == 0 {
                    current = None;
                }
            }
            (ITEM_TYPE_MAIN, MAIN_INPUT) => {
                if let Some(info) = current.and_then(|i| infos.get_mut(i)) {
                    info.input_bits += global.report_size * global.report_count;
                }
            }
            _ => {}
        }

        // Local items only apply up to the next main item.
        if item_type == ITEM_TYPE_MAIN {
            usage = None;
        }
        offset = data_start + size;
    }

    Ok(infos)
}

/// A raw report after routing through the descriptor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedReport {
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
    /// Consumer control, vendor pages, unknown report ids and the like.
    Other,
}

/// Finds the collection a raw report belongs to and extracts the keyboard or
/// mouse sub-report.
pub fn classify_report(infos: &[ReportInfo], report: &[u8]) -> ClassifiedReport {
    let uses_ids = infos.iter().any(|i| i.report_id != 0);
    let (info, body) = if uses_ids {
        let Some((&id, rest)) = report.split_first() else {
            return ClassifiedReport::Other;
        };
        match infos.iter().find(|i| i.report_id == id) {
            Some(info) => (info, rest),
            None => return ClassifiedReport::Other,
        }
    } else {
        match infos.first() {
            Some(info) => (info, report),
            None => return ClassifiedReport::Other,
        }
    };

    if info.usage_page != USAGE_PAGE_DESKTOP {
        return ClassifiedReport::Other;
    }
    match info.usage {
        USAGE_KEYBOARD => KeyboardReport::from_bytes(body)
            .map(ClassifiedReport::Keyboard)
            .unwrap_or(ClassifiedReport::Other),
        USAGE_MOUSE => MouseReport::from_bytes(body)
            .map(ClassifiedReport::Mouse)
            .unwrap_or(ClassifiedReport::Other),
        _ => ClassifiedReport::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The boot keyboard descriptor from the HID specification, appendix B.1.
    const BOOT_KEYBOARD: &[u8] = &[
        0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x05, 0x07, 0x19, 0xE0, 0x29, 0xE7, 0x15, 0x00,
        0x25, 0x01, 0x75, 0x01, 0x95, 0x08, 0x81, 0x02, 0x95, 0x01, 0x75, 0x08, 0x81, 0x01,
        0x95, 0x05, 0x75, 0x01, 0x05, 0x08, 0x19, 0x01, 0x29, 0x05, 0x91, 0x02, 0x95, 0x01,
        0x75, 0x03, 0x91, 0x01, 0x95, 0x06, 0x75, 0x08, 0x15, 0x00, 0x25, 0x65, 0x05, 0x07,
        0x19, 0x00, 0x29, 0x65, 0x81, 0x00, 0xC0,
    ];

    /// Keyboard (id 1) and consumer control (id 3) in one descriptor.
    const COMPOSITE: &[u8] = &[
        0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0x85, 0x01, 0x75, 0x08, 0x95, 0x08, 0x81, 0x00,
        0xC0, 0x05, 0x0C, 0x09, 0x01, 0xA1, 0x01, 0x85, 0x03, 0x75, 0x10, 0x95, 0x01, 0x81,
        0x00, 0xC0, 0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0x85, 0x02, 0x09, 0x01, 0xA1, 0x00,
        0x75, 0x08, 0x95, 0x04, 0x81, 0x06, 0xC0, 0xC0,
    ];

    #[test]
    fn test_boot_keyboard_descriptor() {
        // Act
        let infos = parse_report_descriptor(BOOT_KEYBOARD).unwrap();

        // Assert
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].report_id, 0);
        assert_eq!(infos[0].usage_page, USAGE_PAGE_DESKTOP);
        assert_eq!(infos[0].usage, USAGE_KEYBOARD);
        assert_eq!(infos[0].input_bits, 64);
    }

    #[test]
    fn test_composite_descriptor_yields_one_info_per_collection() {
        let infos = parse_report_descriptor(COMPOSITE).unwrap();
        let summary: Vec<(u8, u16, u16)> = infos
            .iter()
            .map(|i| (i.report_id, i.usage_page, i.usage))
            .collect();
        assert_eq!(
            summary,
            vec![(1, 0x01, 0x06), (3, 0x0C, 0x01), (2, 0x01, 0x02)]
        );
    }

    #[test]
    fn test_truncated_item_is_rejected() {
        assert_eq!(
            parse_report_descriptor(&[0x05, 0x01, 0x09]),
            Err(DescriptorError::Truncated { offset: 2 })
        );
    }

    #[test]
    fn test_unbalanced_end_collection_is_rejected() {
        assert_eq!(
            parse_report_descriptor(&[0xC0]),
            Err(DescriptorError::UnbalancedCollection { offset: 0 })
        );
    }

    #[test]
    fn test_infos_are_capped() {
        let one = [0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0xC0];
        let many: Vec<u8> = one.iter().copied().cycle().take(one.len() * 6).collect();
        assert_eq!(parse_report_descriptor(&many).unwrap().len(), MAX_REPORT_INFOS);
    }

    #[test]
    fn test_classify_keyboard_sub_report_by_id() {
        // Arrange
        let infos = parse_report_descriptor(COMPOSITE).unwrap();
        let raw = [0x01, 0x02, 0x00, 0x04, 0, 0, 0, 0, 0];

        // Act
        let classified = classify_report(&infos, &raw);

        // Assert
        assert_eq!(
            classified,
            ClassifiedReport::Keyboard(KeyboardReport::key(0x02, 0x04))
        );
    }

    #[test]
    fn test_classify_mouse_and_other() {
        let infos = parse_report_descriptor(COMPOSITE).unwrap();
        assert!(matches!(
            classify_report(&infos, &[0x02, 0x01, 0x05, 0xFB, 0x00]),
            ClassifiedReport::Mouse(MouseReport { buttons: 1, x: 5, y: -5, .. })
        ));
        assert_eq!(classify_report(&infos, &[0x03, 0xE9, 0x00]), ClassifiedReport::Other);
        assert_eq!(classify_report(&infos, &[0x09, 0x00]), ClassifiedReport::Other);
    }

    #[test]
    fn test_classify_without_report_ids_uses_whole_report() {
        let infos = parse_report_descriptor(BOOT_KEYBOARD).unwrap();
        assert_eq!(
            classify_report(&infos, &[0, 0, 0x05, 0, 0, 0, 0, 0]),
            ClassifiedReport::Keyboard(KeyboardReport::key(0, 0x05))
        );
    }
}
