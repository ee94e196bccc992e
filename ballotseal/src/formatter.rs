//! Serialization of the decrypted result.
//!
//! The formatter's output is exactly the byte string that gets signed and
//! committed, so it must be stable: element order, key order and
//! whitespace all change the signature.

use serde::Serialize;
use serde_json::value::RawValue;

use crate::error::Error;

/// Turns `(poll id, ordered plaintexts)` into the bytes to sign. The
/// decrypter accepts any formatter; [`json_content`] is the default.
pub type ContentFormatter =
    Box<dyn Fn(&str, &[Vec<u8>]) -> Result<Vec<u8>, Error> + Send + Sync>;

/// The default formatter: `{"id":"<poll>","votes":[...]}` with every
/// decrypted vote embedded as a raw JSON value. A vote that is not valid
/// JSON fails the whole serialization.
pub fn json_content(poll_id: &str, votes: &[Vec<u8>]) -> Result<Vec<u8>, Error> {
    #[derive(Serialize)]
    struct Content<'a> {
        id: &'a str,
        votes: Vec<&'a RawValue>,
    }

    let mut raw = Vec::with_capacity(votes.len());
    for vote in votes {
        let value = serde_json::from_slice::<&RawValue>(vote)
            .map_err(|err| Error::other(format!("vote is not valid json: {}", err)))?;
        raw.push(value);
    }

    serde_json::to_vec(&Content {
        id: poll_id,
        votes: raw,
    })
    .map_err(|err| Error::other(format!("serializing decrypted content: {}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeds_votes_as_raw_json() {
        let votes = vec![b"\"Y\"".to_vec(), b"{\"rank\":[1,2]}".to_vec()];
        let content = json_content("test/1", &votes).unwrap();
        assert_eq!(
            content,
            br#"{"id":"test/1","votes":["Y",{"rank":[1,2]}]}"#
        );
    }

    #[test]
    fn empty_vote_list() {
        let content = json_content("test/1", &[]).unwrap();
        assert_eq!(content, br#"{"id":"test/1","votes":[]}"#);
    }

    #[test]
    fn error_sentinel_is_embeddable() {
        let votes = vec![br#"{"error":"encryption not valid"}"#.to_vec()];
        let content = json_content("p", &votes).unwrap();
        assert_eq!(
            content,
            br#"{"id":"p","votes":[{"error":"encryption not valid"}]}"#
        );
    }

    #[test]
    fn rejects_votes_that_are_not_json() {
        let votes = vec![b"not json".to_vec()];
        assert!(json_content("test/1", &votes).is_err());
    }
}
