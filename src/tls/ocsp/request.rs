//! OCSP request construction and response status parsing (RFC 6960).
//!
//! Only the parts needed for stapling are implemented: a single-CertID
//! request with SHA-1 hashes, which every public responder accepts, and a
//! read of the outer `responseStatus`. The response itself is stapled as-is;
//! clients verify it.

use sha1::{Digest, Sha1};
use x509_parser::oid_registry;
use x509_parser::prelude::*;

use crate::tls::ocsp::OcspError;

/// id-sha1 (1.3.14.3.2.26)
const SHA1_OID: &[u8] = &[0x2B, 0x0E, 0x03, 0x02, 0x1A];

/// Cache key for one certificate: hex of issuer name hash, issuer key hash and serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OcspKey(String);

impl OcspKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OcspKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A ready-to-send OCSP request.
#[derive(Debug, Clone)]
pub struct OcspRequest {
    pub key: OcspKey,
    pub responder_url: String,
    pub der: Vec<u8>,
}

impl OcspRequest {
    /// Build the request for `cert_der`, issued by `issuer_der`.
    pub fn for_certificate(cert_der: &[u8], issuer_der: &[u8]) -> Result<Self, OcspError> {
        let (_, cert) =
            X509Certificate::from_der(cert_der).map_err(|e| OcspError::Certificate(e.to_string()))?;
        let (_, issuer) =
            X509Certificate::from_der(issuer_der).map_err(|e| OcspError::Certificate(e.to_string()))?;

        let responder_url = responder_url(&cert)?.ok_or(OcspError::NoResponder)?;

        let name_hash = Sha1::digest(issuer.subject().as_raw());
        let key_hash = Sha1::digest(issuer.public_key().subject_public_key.data.as_ref());
        let serial = cert.raw_serial();

        let key = OcspKey(format!(
            "{}:{}:{}",
            hex::encode(name_hash),
            hex::encode(key_hash),
            hex::encode(serial)
        ));

        Ok(Self {
            key,
            responder_url,
            der: encode_request(&name_hash, &key_hash, serial),
        })
    }
}

/// The first OCSP URI in the Authority Information Access extension.
pub fn responder_url(cert: &X509Certificate<'_>) -> Result<Option<String>, OcspError> {
    for ext in cert.extensions() {
        if ext.oid != oid_registry::OID_PKIX_AUTHORITY_INFO_ACCESS {
            continue;
        }
        let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() else {
            return Err(OcspError::Certificate("unreadable Authority Information Access".into()));
        };
        for desc in &aia.accessdescs {
            if desc.access_method != oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_OCSP {
                continue;
            }
            if let GeneralName::URI(uri) = &desc.access_location {
                return Ok(Some(uri.to_string()));
            }
        }
    }
    Ok(None)
}

/// Check `responseStatus`; only `successful` with a body is stapleable.
pub fn check_response(bytes: &[u8]) -> Result<(), OcspError> {
    let malformed = || OcspError::Unavailable("malformed OCSP response".into());

    let (tag, content, _) = read_tlv(bytes).ok_or_else(malformed)?;
    if tag != 0x30 {
        return Err(malformed());
    }
    let (tag, status, rest) = read_tlv(content).ok_or_else(malformed)?;
    if tag != 0x0A || status.len() != 1 {
        return Err(malformed());
    }

    match status[0] {
        0 => match read_tlv(rest) {
            Some((0xA0, _, _)) => Ok(()),
            _ => Err(malformed()),
        },
        code => Err(OcspError::ResponderError(status_name(code).to_string())),
    }
}

fn status_name(code: u8) -> &'static str {
    match code {
        1 => "malformedRequest",
        2 => "internalError",
        3 => "tryLater",
        5 => "sigRequired",
        6 => "unauthorized",
        _ => "unknown status",
    }
}

fn encode_request(name_hash: &[u8], key_hash: &[u8], serial: &[u8]) -> Vec<u8> {
    let algorithm = tlv(0x30, &[tlv(0x06, SHA1_OID), vec![0x05, 0x00]].concat());
    let cert_id = tlv(
        0x30,
        &[algorithm, tlv(0x04, name_hash), tlv(0x04, key_hash), tlv(0x02, serial)].concat(),
    );
    let request = tlv(0x30, &cert_id);
    let request_list = tlv(0x30, &request);
    let tbs_request = tlv(0x30, &request_list);
    tlv(0x30, &tbs_request)
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 4);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | (bytes.len() - skip) as u8);
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Split one DER element off the front: (tag, content, rest).
fn read_tlv(input: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = input.split_first()?;
    let (&first, rest) = rest.split_first()?;
    let (len, rest) = if first < 0x80 {
        (first as usize, rest)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 || rest.len() < count {
            return None;
        }
        let len = rest[..count].iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, &rest[count..])
    };
    if rest.len() < len {
        return None;
    }
    Some((tag, &rest[..len], &rest[len..]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, CustomExtension, IsCa, KeyPair};

    /// AIA extension value with one OCSP access description.
    pub(crate) fn aia_extension(url: &str) -> CustomExtension {
        // id-ad-ocsp 1.3.6.1.5.5.7.48.1
        let method = tlv(0x06, &[0x2B, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01]);
        let location = tlv(0x86, url.as_bytes());
        let desc = tlv(0x30, &[method, location].concat());
        let value = tlv(0x30, &desc);
        CustomExtension::from_oid_content(&[1, 3, 6, 1, 5, 5, 7, 1, 1], value)
    }

    /// (leaf DER, issuer DER); the leaf names `ocsp_url` when given.
    pub(crate) fn leaf_and_issuer(ocsp_url: Option<&str>) -> (Vec<u8>, Vec<u8>) {
        let ca_key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.distinguished_name.push(rcgen::DnType::CommonName, "OCSP Test CA");
        let ca = params.self_signed(&ca_key).unwrap();

        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["gateway.test".to_string()]).unwrap();
        params.serial_number = Some(rcgen::SerialNumber::from(vec![0x01, 0x02, 0x03]));
        if let Some(url) = ocsp_url {
            params.custom_extensions.push(aia_extension(url));
        }
        let leaf = params.signed_by(&key, &ca, &ca_key).unwrap();

        (leaf.der().to_vec(), ca.der().to_vec())
    }

    #[test]
    fn builds_request_with_sha1_cert_id() {
        let (leaf, issuer) = leaf_and_issuer(Some("http://ocsp.test/"));
        let request = OcspRequest::for_certificate(&leaf, &issuer).unwrap();

        assert_eq!(request.responder_url, "http://ocsp.test/");
        assert!(request.key.as_str().ends_with(":010203"));

        // Outer OCSPRequest SEQUENCE spans the whole buffer.
        let (tag, _, rest) = read_tlv(&request.der).unwrap();
        assert_eq!(tag, 0x30);
        assert!(rest.is_empty());
        let sha1_oid = tlv(0x06, SHA1_OID);
        assert!(request.der.windows(sha1_oid.len()).any(|w| w == sha1_oid.as_slice()));
    }

    #[test]
    fn same_certificate_same_key() {
        let (leaf, issuer) = leaf_and_issuer(Some("http://ocsp.test/"));
        let a = OcspRequest::for_certificate(&leaf, &issuer).unwrap();
        let b = OcspRequest::for_certificate(&leaf, &issuer).unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(a.der, b.der);
    }

    #[test]
    fn missing_aia_means_no_responder() {
        let (leaf, issuer) = leaf_and_issuer(None);
        let (_, cert) = X509Certificate::from_der(&leaf).unwrap();
        assert_eq!(responder_url(&cert).unwrap(), None);
        assert!(matches!(
            OcspRequest::for_certificate(&leaf, &issuer),
            Err(OcspError::NoResponder)
        ));
    }

    #[test]
    fn checks_response_status() {
        // successful + [0] responseBytes
        let ok = tlv(0x30, &[tlv(0x0A, &[0]), tlv(0xA0, &[0x30, 0x00])].concat());
        assert!(check_response(&ok).is_ok());

        let try_later = tlv(0x30, &tlv(0x0A, &[3]));
        assert_eq!(
            check_response(&try_later).unwrap_err(),
            OcspError::ResponderError("tryLater".into())
        );

        assert!(matches!(check_response(b"<html>"), Err(OcspError::Unavailable(_))));
        assert!(matches!(check_response(&tlv(0x30, &tlv(0x0A, &[0]))), Err(OcspError::Unavailable(_))));
    }

    #[test]
    fn long_form_lengths() {
        let content = vec![0xAB; 300];
        let encoded = tlv(0x04, &content);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2C]);
        let (_, parsed, rest) = read_tlv(&encoded).unwrap();
        assert_eq!(parsed, content.as_slice());
        assert!(rest.is_empty());
    }
}
