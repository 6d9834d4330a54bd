//! Small helpers for working with raw and typed BSON documents that don't belong to any single
//! operation.

use std::time::Duration;

use bson::{Bson, RawBsonRef, RawDocument, RawDocumentBuf};
use serde::{ser, Deserialize, Deserializer, Serializer};

use crate::error::{ErrorKind, Result};

/// Coerce numeric types into an `i64` if it would be lossless to do so.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if f == f as i64 as f64 => Some(f as i64),
        _ => None,
    }
}

/// Coerce numeric types into a `u64` if it would be lossless and non-negative to do so.
pub(crate) fn get_u64(val: &Bson) -> Option<u64> {
    match *val {
        Bson::Int32(i) if i >= 0 => Some(i as u64),
        Bson::Int64(i) if i >= 0 => Some(i as u64),
        Bson::Double(f) if f >= 0.0 && f == f as u64 as f64 => Some(f as u64),
        _ => None,
    }
}

pub(crate) fn first_key(document: &RawDocument) -> Result<Option<&str>> {
    match document.iter().next() {
        Some(result) => {
            let (key, _) = result?;
            Ok(Some(key))
        }
        None => Ok(None),
    }
}

/// A replacement document's first key must not be an update operator.
pub(crate) fn replacement_document_check(replacement: &RawDocument) -> Result<()> {
    match first_key(replacement)? {
        Some(s) if !s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "replacement document must have a first key not starting with '$'"
                .to_string(),
        }
        .into()),
    }
}

/// An update document's first key must be an update operator.
pub(crate) fn update_document_check(update: &RawDocument) -> Result<()> {
    match first_key(update)? {
        Some(s) if s.starts_with('$') => Ok(()),
        _ => Err(ErrorKind::InvalidArgument {
            message: "update document must have a first key starting with '$'".to_string(),
        }
        .into()),
    }
}

pub(crate) fn extend_raw_document_buf(
    base: &mut RawDocumentBuf,
    other: RawDocumentBuf,
) -> Result<()> {
    for result in other.iter() {
        let (key, value) = result?;
        let value: RawBsonRef = value;
        base.append(key, value.to_raw_bson());
    }
    Ok(())
}

/// The number of bytes an element at array index `i` contributes to a document's serialized
/// size, used when estimating whether a document can be appended to a document sequence without
/// exceeding the server's maximum message size.
pub(crate) fn array_entry_size_bytes(i: usize, doc_len: usize) -> usize {
    1 + num_decimal_digits(i) + 1 + doc_len
}

fn num_decimal_digits(n: usize) -> usize {
    let mut digits = 1;
    let mut curr = 10usize;
    while curr <= n {
        curr = match curr.checked_mul(10) {
            Some(val) => val,
            None => break,
        };
        digits += 1;
    }
    digits
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_u32_as_i32<S: Serializer>(
    val: &u32,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if *val <= i32::MAX as u32 {
        serializer.serialize_i32(*val as i32)
    } else {
        Err(ser::Error::custom("u32 specified does not fit into an i32"))
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
pub(crate) fn serialize_u32_option_as_i32<S: Serializer>(
    val: &Option<u32>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(val) => serialize_u32_as_i32(val, serializer),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn serialize_duration_option_as_int_secs<S: Serializer>(
    val: &Option<Duration>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match val {
        Some(duration) => serializer.serialize_i64(duration.as_secs() as i64),
        None => serializer.serialize_none(),
    }
}

pub(crate) fn deserialize_duration_option_from_u64_seconds<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = Option::<u64>::deserialize(deserializer)?;
    Ok(secs.map(Duration::from_secs))
}

#[cfg(test)]
mod test {
    use bson::Bson;

    use super::{get_int, get_u64};

    #[test]
    fn get_int_coerces_lossless_values() {
        assert_eq!(get_int(&Bson::Int32(5)), Some(5));
        assert_eq!(get_int(&Bson::Double(5.0)), Some(5));
        assert_eq!(get_int(&Bson::Double(5.5)), None);
        assert_eq!(get_int(&Bson::String("5".to_string())), None);
    }

    #[test]
    fn get_u64_rejects_negative_values() {
        assert_eq!(get_u64(&Bson::Int64(-1)), None);
        assert_eq!(get_u64(&Bson::Int64(7)), Some(7));
    }
}
