//! Byte-level formats: persisted keydefs, value framing, the macro text
//! format, HID report descriptors and diagnostic sequence numbers.

pub mod codec;
pub mod descriptor;
pub mod framing;
pub mod sequence;
pub mod text;

pub use codec::{decode_keydef, encode_keydef, keydef_key, parse_keydef_key, CodecError, KEYDEF_PREFIX};
pub use descriptor::{classify_report, parse_report_descriptor, ClassifiedReport, DescriptorError, ReportInfo};
pub use framing::{PlainValue, SealedValue, StoredValue};
pub use sequence::SequenceCounter;
pub use text::{parse_macros, serialize_macros, MacroParseError};
