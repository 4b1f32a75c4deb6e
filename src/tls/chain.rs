//! Certificate and key loading, chain assembly.
//!
//! The served chain is the certificate file followed by any intermediates
//! from the CA bundle that continue it. The whole CA bundle is trusted for
//! client certificates.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::RootCertStore;
use x509_parser::prelude::*;

use crate::tls::TlsError;

/// Read every certificate in a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;

    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.display().to_string()));
    }
    Ok(certs)
}

/// Read the first private key in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.display().to_string()))
}

/// Raw subject and issuer names of a DER certificate.
fn names(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TlsError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| TlsError::Certificate(e.to_string()))?;
    Ok((cert.subject().as_raw().to_vec(), cert.issuer().as_raw().to_vec()))
}

/// The server's certificate chain plus its trust material.
#[derive(Debug, Clone)]
pub struct CertificateChain {
    /// Leaf first, then intermediates.
    pub served: Vec<CertificateDer<'static>>,
    /// Issuer of the leaf, when known. Needed for OCSP requests.
    pub issuer: Option<CertificateDer<'static>>,
    /// The CA bundle as loaded.
    pub ca: Vec<CertificateDer<'static>>,
}

impl CertificateChain {
    /// Assemble the served chain from the certificate file and CA bundle.
    pub fn assemble(
        server: Vec<CertificateDer<'static>>,
        ca: Vec<CertificateDer<'static>>,
    ) -> Result<Self, TlsError> {
        let mut served = server;
        if served.is_empty() {
            return Err(TlsError::NoCertificates("server certificate".into()));
        }

        let mut ca_names = Vec::with_capacity(ca.len());
        for cert in &ca {
            ca_names.push(names(cert)?);
        }

        // Walk issuer links through the bundle, stopping at self-signed roots.
        loop {
            let Some(last) = served.last() else { break };
            let (subject, issuer) = names(last)?;
            if subject == issuer {
                break;
            }
            let next = ca
                .iter()
                .zip(&ca_names)
                .find(|(cert, (ca_subject, ca_issuer))| {
                    *ca_subject == issuer && ca_subject != ca_issuer && !served.contains(*cert)
                })
                .map(|(cert, _)| cert.clone());
            match next {
                Some(cert) => served.push(cert),
                None => break,
            }
        }

        let (_, leaf_issuer) = names(&served[0])?;
        let issuer = served
            .iter()
            .skip(1)
            .chain(ca.iter())
            .find(|cert| names(cert).map(|(subject, _)| subject == leaf_issuer).unwrap_or(false))
            .cloned();

        Ok(Self { served, issuer, ca })
    }

    /// Load from configured paths.
    pub fn load(cert_path: &Path, ca_path: Option<&Path>) -> Result<Self, TlsError> {
        let server = load_certs(cert_path)?;
        let ca = match ca_path {
            Some(path) => load_certs(path)?,
            None => Vec::new(),
        };
        Self::assemble(server, ca)
    }

    pub fn leaf(&self) -> &CertificateDer<'static> {
        &self.served[0]
    }

    /// Trust store for client certificates. `None` when there is no CA bundle.
    pub fn client_roots(&self) -> Result<Option<RootCertStore>, TlsError> {
        if self.ca.is_empty() {
            return Ok(None);
        }
        let mut roots = RootCertStore::empty();
        for cert in &self.ca {
            roots.add(cert.clone())?;
        }
        Ok(Some(roots))
    }
}
