// Copyright (c) 2026 Twinport Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Throwaway PKI for integration tests: one CA, a server certificate for
//! `localhost`, and client certificates (valid, expired, foreign CA), all
//! written as PEM files into a temporary directory.

#![allow(dead_code)]

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Identity {
    pub cert_pem: String,
    pub key_pem: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

struct Authority {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.distinguished_name.push(DnType::CommonName, name);
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
            KeyUsagePurpose::DigitalSignature,
        ];
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    fn issue(&self, params: CertificateParams) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        (cert.pem(), key.serialize_pem())
    }
}

pub struct TestPki {
    dir: TempDir,
    ca: Authority,
    foreign: Authority,
    pub ca_pem: String,
    pub ca_path: PathBuf,
}

impl TestPki {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ca = Authority::new("twinport test CA");
        let foreign = Authority::new("somebody else's CA");
        let ca_pem = ca.cert.pem();
        let ca_path = dir.path().join("ca.crt");
        std::fs::write(&ca_path, &ca_pem).unwrap();
        Self {
            dir,
            ca,
            foreign,
            ca_pem,
            ca_path,
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn server(&self) -> Identity {
        let mut params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
        params.distinguished_name.push(DnType::CommonName, "twinport server");
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        self.write("server", self.ca.issue(params))
    }

    pub fn client(&self, name: &str) -> Identity {
        self.write(name, self.ca.issue(client_params(name)))
    }

    pub fn expired_client(&self) -> Identity {
        let mut params = client_params("expired");
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        self.write("expired", self.ca.issue(params))
    }

    pub fn foreign_client(&self) -> Identity {
        self.write("foreign", self.foreign.issue(client_params("foreign")))
    }

    /// Write a file with arbitrary contents next to the fixtures.
    pub fn write_raw(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn write(&self, name: &str, (cert_pem, key_pem): (String, String)) -> Identity {
        let cert_path = self.write_raw(&format!("{name}.crt"), &cert_pem);
        let key_path = self.write_raw(&format!("{name}.key"), &key_pem);
        Identity {
            cert_pem,
            key_pem,
            cert_path,
            key_path,
        }
    }
}

fn client_params(name: &str) -> CertificateParams {
    let mut params = CertificateParams::new(vec![format!("{name}.clients.twinport.test")]).unwrap();
    params.distinguished_name.push(DnType::CommonName, name);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];
    params
}
