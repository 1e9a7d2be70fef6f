//! Get and put command implementations.

use super::{open_store, CommandResult};
use crate::GeometryArgs;
use std::path::Path;
use tracing::debug;

/// Prints the newest value stored under `id`.
pub fn get(path: &Path, geometry: &GeometryArgs, id: u16, hex: bool) -> CommandResult {
    let store = open_store(path, geometry)?;
    let entry = store.get_last_entry(id)?;
    store.check_crc(&entry)?;
    let value = store.read_entry(&entry)?;
    debug!(%entry, "read value");

    if hex {
        println!("{}", encode_hex(&value));
    } else {
        println!("{}", String::from_utf8_lossy(&value));
    }
    Ok(())
}

/// Writes `value` under `id`.
pub fn put(path: &Path, geometry: &GeometryArgs, id: u16, value: &str, hex: bool) -> CommandResult {
    let data = if hex {
        decode_hex(value)?
    } else {
        value.as_bytes().to_vec()
    };

    let store = open_store(path, geometry)?;
    let entry = store.write_entry(id, &data)?;
    store.flash().sync()?;
    println!("Wrote {}", entry);
    Ok(())
}

/// Lowercase hex rendering of `bytes`.
pub fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Parses hex digits, ignoring whitespace.
pub fn decode_hex(s: &str) -> CommandResult<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err("hex value needs an even number of digits".into());
    }
    digits
        .chunks(2)
        .map(|pair| -> CommandResult<u8> {
            let text = std::str::from_utf8(pair)?;
            Ok(u8::from_str_radix(text, 16)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::format;
    use sfcb_core::DEFAULT_MAGIC;

    fn geometry() -> GeometryArgs {
        GeometryArgs {
            sector_size: 256,
            sector_count: 4,
            align: 4,
            magic: DEFAULT_MAGIC,
            no_gc: false,
        }
    }

    #[test]
    fn test_hex_roundtrip() {
        assert_eq!(decode_hex("de ad BE ef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(encode_hex(&[0x01, 0xAB]), "01ab");
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_put_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        format::run(&path, &geometry(), false).unwrap();

        put(&path, &geometry(), 0x12, "hello", false).unwrap();
        put(&path, &geometry(), 0x12, "68656c6c6f21", true).unwrap();
        get(&path, &geometry(), 0x12, false).unwrap();

        let store = open_store(&path, &geometry()).unwrap();
        let entry = store.get_last_entry(0x12).unwrap();
        assert_eq!(store.read_entry(&entry).unwrap(), b"hello!");
    }

    #[test]
    fn test_get_missing_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.img");
        format::run(&path, &geometry(), false).unwrap();
        assert!(get(&path, &geometry(), 5, false).is_err());
    }

    #[test]
    fn test_missing_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(get(&dir.path().join("none.img"), &geometry(), 1, false).is_err());
    }
}
