use std::fs;
use std::path::{Path, PathBuf};

use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::RsaPrivateKey;
use tracing::{debug, info, warn};

use crate::store::{persist_private, stage_private};
use crate::Error;

const PRIVATE_KEY_FILE: &str = "privatecert.pem";
const CERTIFICATE_FILE: &str = "publiccert.cer";
const KEY_BITS: usize = 2048;

/// Subject and lifetime of the self-signed certificate.
#[derive(Debug, Clone)]
pub struct CertificateSubject {
    pub country: String,
    pub organization: String,
    pub validity_days: i64,
}

impl Default for CertificateSubject {
    fn default() -> Self {
        Self {
            country: "SE".to_string(),
            organization: "Efficra Consulting KB".to_string(),
            validity_days: 1825,
        }
    }
}

/// The RSA key pair and certificate used to sign client assertions.
///
/// One pair lives in `dir`; it is generated when either file is missing and
/// otherwise reused until [`KeyMaterial::rotate`] is called.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    dir: PathBuf,
    subject: CertificateSubject,
}

impl KeyMaterial {
    pub fn new(dir: impl Into<PathBuf>, subject: CertificateSubject) -> Self {
        Self {
            dir: dir.into(),
            subject,
        }
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.dir.join(PRIVATE_KEY_FILE)
    }

    pub fn certificate_path(&self) -> PathBuf {
        self.dir.join(CERTIFICATE_FILE)
    }

    /// Generates a fresh pair only if the key or the certificate is missing,
    /// or if the certificate was not issued for the stored key. Returns
    /// whether anything was generated.
    pub fn ensure(&self) -> Result<bool, Error> {
        if self.private_key_path().exists() && self.certificate_path().exists() {
            if self.pair_matches() {
                debug!(dir = %self.dir.display(), "using existing key material");
                return Ok(false);
            }
            warn!(dir = %self.dir.display(), "certificate does not match private key, regenerating");
        }

        self.generate()?;
        Ok(true)
    }

    /// Replaces the current pair unconditionally.
    pub fn rotate(&self) -> Result<(), Error> {
        info!(dir = %self.dir.display(), "rotating key material");
        self.generate()
    }

    pub fn private_key_pem(&self) -> Result<String, Error> {
        read_pem(&self.private_key_path())
            .map_err(|e| Error::Signing(format!("unable to read private key: {}", e)))
    }

    /// The PEM certificate, to be uploaded to the provider.
    pub fn public_certificate(&self) -> Result<String, Error> {
        Ok(read_pem(&self.certificate_path())?)
    }

    /// True when the certificate carries the stored key's public half.
    pub fn pair_matches(&self) -> bool {
        match (self.private_key_pem(), self.certificate_der()) {
            (Ok(key_pem), Ok(cert_der)) => certificate_matches_key(&cert_der, &key_pem),
            _ => false,
        }
    }

    fn certificate_der(&self) -> Result<Vec<u8>, Error> {
        let pem = self.public_certificate()?;
        rustls_pemfile::certs(&mut pem.as_bytes())?
            .into_iter()
            .next()
            .ok_or_else(|| Error::KeyGeneration("no certificate in PEM file".into()))
    }

    fn generate(&self) -> Result<(), Error> {
        info!("generating RSA {}-bit key and self-signed certificate", KEY_BITS);
        fs::create_dir_all(&self.dir)?;

        let key = RsaPrivateKey::new(&mut rand::thread_rng(), KEY_BITS)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        let key_pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;

        let cert_pem = self_signed_certificate(&key_pem, &self.subject)?;

        // Stage both files before touching either, so a failed write never
        // leaves a new key next to an old certificate.
        let staged_key = stage_private(&self.dir, key_pem.as_bytes())?;
        let staged_cert = stage_private(&self.dir, cert_pem.as_bytes())?;
        persist_private(staged_key, &self.private_key_path())?;
        persist_private(staged_cert, &self.certificate_path())?;

        info!(
            key = %self.private_key_path().display(),
            certificate = %self.certificate_path().display(),
            "key material written"
        );
        Ok(())
    }
}

fn self_signed_certificate(key_pem: &str, subject: &CertificateSubject) -> Result<String, Error> {
    let key_pair = KeyPair::from_pem_and_sign_algo(key_pem, &PKCS_RSA_SHA256)
        .map_err(|e| Error::KeyGeneration(e.to_string()))?;

    let mut name = DistinguishedName::new();
    name.push(DnType::CountryName, subject.country.as_str());
    name.push(DnType::OrganizationName, subject.organization.as_str());

    let now = time::OffsetDateTime::now_utc();
    let mut params = CertificateParams::default();
    params.alg = &PKCS_RSA_SHA256;
    params.key_pair = Some(key_pair);
    params.distinguished_name = name;
    params.not_before = now;
    params.not_after = now + time::Duration::days(subject.validity_days);

    Certificate::from_params(params)
        .and_then(|cert| cert.serialize_pem())
        .map_err(|e| Error::KeyGeneration(e.to_string()))
}

/// The certificate's SubjectPublicKeyInfo is embedded verbatim in its DER, so
/// a byte search for the key's SPKI is enough to confirm the pair.
fn certificate_matches_key(cert_der: &[u8], key_pem: &str) -> bool {
    let spki = match RsaPrivateKey::from_pkcs8_pem(key_pem)
        .ok()
        .and_then(|key| key.to_public_key().to_public_key_der().ok())
    {
        Some(spki) => spki,
        None => return false,
    };
    let spki = spki.as_bytes();

    cert_der.windows(spki.len()).any(|w| w == spki)
}

fn read_pem(path: &Path) -> std::io::Result<String> {
    fs::read_to_string(path)
}
