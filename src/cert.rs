use std::io::{BufReader, Cursor};

use der::{
    time::{OffsetDateTime, PrimitiveDateTime},
    Decode as _, EncodePem as _,
};
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use x509_cert::{
    builder::{Builder as _, RequestBuilder as CsrBuilder},
    name::Name,
};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Make a P-256 private key (from which we can derive a public key).
pub fn create_p256_key() -> p256::ecdsa::SigningKey {
    let csprng = &mut rand::thread_rng();
    ecdsa::SigningKey::from(p256::SecretKey::random(csprng))
}

/// Creates a CSR whose subject uses `ip` as the Common Name and signs it with
/// `signer`.
///
/// No IP Subject Alternative Name is added; the authority checks control of
/// the address out of band via the HTTP file validation.
pub(crate) fn create_csr(
    signer: &p256::ecdsa::SigningKey,
    ip: &str,
) -> Result<x509_cert::request::CertReq> {
    let subject = format!("CN={ip}")
        .parse::<Name>()
        .map_err(|err| Error::Csr(format!("subject for {ip}: {err}")))?;

    let csr = CsrBuilder::new(subject, signer).map_err(|err| Error::Csr(err.to_string()))?;

    csr.build::<p256::ecdsa::DerSignature>()
        .map_err(|err| Error::Csr(err.to_string()))
}

/// PEM-encodes a CSR the way the authority expects to receive it.
pub(crate) fn csr_to_pem(csr: &x509_cert::request::CertReq) -> Result<String> {
    csr.to_pem(der::pem::LineEnding::LF)
        .map_err(|err| Error::Csr(err.to_string()))
}

/// PKCS#8 PEM encoding of a private key.
pub(crate) fn key_to_pem(key: &p256::ecdsa::SigningKey) -> Result<Zeroizing<String>> {
    key.to_pkcs8_pem(der::pem::LineEnding::LF)
        .map_err(|err| Error::KeyGen(err.to_string()))
}

/// Expiry (`notAfter`) of the first certificate in a PEM chain.
///
/// The leaf comes first in downloaded bundles, so this is the expiry that
/// matters for renewal.
pub(crate) fn chain_not_after(pem_chain: &str) -> Result<OffsetDateTime> {
    let mut rdr = BufReader::new(Cursor::new(pem_chain));

    let leaf = rustls_pemfile::certs(&mut rdr)
        .next()
        .ok_or_else(|| Error::CertParse("no certificates in chain".to_owned()))?
        .map_err(|err| Error::CertParse(err.to_string()))?;

    let cert = x509_cert::Certificate::from_der(&leaf)
        .map_err(|err| Error::CertParse(err.to_string()))?;

    let not_after = cert.tbs_certificate.validity.not_after.to_date_time();
    let not_after = PrimitiveDateTime::try_from(not_after)
        .map_err(|err| Error::CertParse(err.to_string()))?
        .assume_utc();

    Ok(not_after)
}

/// Encapsulated certificate chain and private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    private_key_pem: Zeroizing<String>,
    certificate: String,
}

impl CertificateBundle {
    pub(crate) fn new(private_key_pem: Zeroizing<String>, certificate: String) -> Self {
        CertificateBundle {
            private_key_pem,
            certificate,
        }
    }

    /// Builds a bundle from PEM strings, validating both parts.
    pub fn parse(private_key_pem: Zeroizing<String>, certificate: String) -> Result<Self> {
        // validate certificate chain
        chain_not_after(&certificate)?;

        // validate private key
        ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(&private_key_pem)
            .map_err(|err| Error::KeyGen(err.to_string()))?;

        Ok(CertificateBundle {
            private_key_pem,
            certificate,
        })
    }

    /// The private key in PEM format.
    pub fn private_key(&self) -> &str {
        &self.private_key_pem
    }

    /// The certificate chain (leaf first) in PEM format.
    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// The certificate chain in DER format.
    pub fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.certificate()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::CertParse(err.to_string()))
    }

    /// Expiry of the leaf certificate.
    pub fn not_after(&self) -> Result<OffsetDateTime> {
        chain_not_after(&self.certificate)
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It is up to the authority to decide how long an issued certificate is
    /// valid; requests ask for 90 days. This counts _whole_ days and can be
    /// negative for an expired certificate.
    pub fn valid_days_left(&self) -> Result<i64> {
        let not_after = self.not_after()?;
        let diff = not_after - OffsetDateTime::now_utc();
        Ok(diff.whole_days())
    }
}
