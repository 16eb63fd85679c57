use bytes::Bytes;

use frame::Error;

/// Strip padding from a padded frame payload.
///
/// The length octet and the trailing padding are removed; the number of
/// padding octets is returned so the caller can account for them in
/// flow control.
pub fn strip_padding(payload: &mut Bytes) -> Result<u8, Error> {
    if payload.is_empty() {
        return Err(Error::PayloadLengthTooShort);
    }

    let pad_len = payload[0] as usize;

    if pad_len >= payload.len() {
        return Err(Error::TooMuchPadding);
    }

    let _ = payload.split_to(1);
    let _ = payload.split_off(payload.len() - pad_len);

    Ok(pad_len as u8)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_length_octet_and_trailer() {
        let mut payload = Bytes::from_static(&[2, b'h', b'i', 0, 0]);
        assert_eq!(strip_padding(&mut payload).unwrap(), 2);
        assert_eq!(&payload[..], b"hi");
    }

    #[test]
    fn rejects_padding_consuming_whole_payload() {
        let mut payload = Bytes::from_static(&[4, 0, 0, 0, 0]);
        assert_eq!(strip_padding(&mut payload), Err(Error::TooMuchPadding));
    }

    #[test]
    fn rejects_empty_padded_payload() {
        let mut payload = Bytes::new();
        assert!(strip_padding(&mut payload).is_err());
    }
}
