// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::*;
use crate::pkcs15::asn1;
use bdrck::cli;
use once_cell::sync::Lazy;
use openssl::pkey::{PKey, Private, Public};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

const MEGABYTE: usize = 1048576;
const PASSPHRASE_PROMPT: &str = "Passphrase: ";

/// The RSA public exponent used for every generated key (F4).
pub const RSA_PUBLIC_EXPONENT: u32 = 0x10001;

/// The key size used when a key spec doesn't name one.
pub const DEFAULT_KEY_BITS: u32 = 1024;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    Rsa,
    Dsa,
    Ec,
}

static ALGORITHM_STRINGS: Lazy<HashMap<Algorithm, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Algorithm::Rsa, "RSA");
    m.insert(Algorithm::Dsa, "DSA");
    m.insert(Algorithm::Ec, "EC");
    m
});

static STRING_ALGORITHMS: Lazy<HashMap<String, Algorithm>> = Lazy::new(|| {
    ALGORITHM_STRINGS
        .iter()
        .map(|pair| (pair.1.to_uppercase(), *pair.0))
        .collect()
});

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", ALGORITHM_STRINGS.get(self).map_or("", |s| *s))
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match STRING_ALGORITHMS.get(&s.to_uppercase()) {
            None => Err(Error::NotSupported(format!("algorithm '{}'", s))),
            Some(a) => Ok(*a),
        }
    }
}

fn algorithm_of<T>(key: &openssl::pkey::PKeyRef<T>) -> Result<Algorithm> {
    Ok(match key.id() {
        openssl::pkey::Id::RSA => Algorithm::Rsa,
        openssl::pkey::Id::DSA => Algorithm::Dsa,
        openssl::pkey::Id::EC => Algorithm::Ec,
        id => {
            return Err(Error::NotSupported(format!(
                "unsupported key algorithm {:?}",
                id
            )));
        }
    })
}

/// A key generation request, as given on the command line: an algorithm
/// optionally followed by a bit length, e.g. "rsa/2048" or "dsa-1024".
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeySpec {
    pub algorithm: Algorithm,
    pub bits: u32,
}

impl FromStr for KeySpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(s.len());
        let algorithm: Algorithm = s[..split].parse()?;
        if algorithm == Algorithm::Ec {
            return Err(Error::NotSupported(format!(
                "{} key generation",
                algorithm
            )));
        }

        let rest = &s[split..];
        let rest = rest
            .strip_prefix('/')
            .or_else(|| rest.strip_prefix('-'))
            .unwrap_or(rest);
        let bits = match rest.is_empty() {
            true => DEFAULT_KEY_BITS,
            false => rest.parse::<u32>().map_err(|_| {
                Error::InvalidArgument(format!("invalid bit number '{}'", rest))
            })?,
        };
        Ok(KeySpec { algorithm, bits })
    }
}

impl fmt::Display for KeySpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm, self.bits)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Format {
    Pem,
    Der,
}

static FORMAT_STRINGS: Lazy<HashMap<Format, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Format::Pem, "PEM");
    m.insert(Format::Der, "DER");
    m
});

static STRING_FORMATS: Lazy<HashMap<String, Format>> = Lazy::new(|| {
    FORMAT_STRINGS
        .iter()
        .map(|pair| (pair.1.to_uppercase(), *pair.0))
        .collect()
});

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", FORMAT_STRINGS.get(self).map_or("", |s| *s))
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match STRING_FORMATS.get(&s.to_uppercase()) {
            None => Err(Error::InvalidArgument(format!("invalid format '{}'", s))),
            Some(o) => Ok(*o),
        }
    }
}

fn read_key_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let mut data: Vec<u8> = Vec::new();
    let mut f = File::open(path)?;
    if f.metadata()?.len() > MEGABYTE as u64 {
        return Err(Error::InvalidArgument(
            "the provided key file exceeded 1 MiB in size".to_owned(),
        ));
    }
    f.read_to_end(&mut data)?;
    Ok(data)
}

/// A public key. Note that this structure denotes *just the key*, not the
/// other metadata which would be included in a full X.509 certificate.
#[derive(Clone)]
pub struct PublicKey {
    inner: PKey<Public>,
}

impl PublicKey {
    pub fn from_pem<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = read_key_file(path)?;
        Ok(PublicKey {
            inner: PKey::public_key_from_pem(data.as_slice())?,
        })
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        algorithm_of(self.inner.as_ref())
    }

    pub fn bits(&self) -> usize {
        self.inner.bits() as usize
    }

    /// The encoding PKCS#15 stores public key files in: an RSAPublicKey for
    /// RSA keys, and the public value y as a bare INTEGER for DSA keys.
    pub fn to_pkcs15_der(&self) -> Result<Vec<u8>> {
        Ok(match self.algorithm()? {
            Algorithm::Rsa => self.inner.rsa()?.public_key_to_der_pkcs1()?,
            Algorithm::Dsa => {
                let dsa = self.inner.dsa()?;
                asn1::big_integer(dsa.pub_key().to_vec().as_slice())?.to_vec()
            }
            algorithm => {
                return Err(Error::NotSupported(format!(
                    "{} public keys can't be stored in PKCS#15 public key files",
                    algorithm
                )));
            }
        })
    }

    pub fn format(&self, format: Format) -> Result<Vec<u8>> {
        Ok(match format {
            Format::Pem => self.inner.public_key_to_pem()?,
            Format::Der => self.inner.public_key_to_der()?,
        })
    }
}

/// A private key, held in host memory.
#[derive(Clone)]
pub struct PrivateKey {
    inner: PKey<Private>,
}

impl PrivateKey {
    /// Generate a new key pair in software.
    pub fn generate(algorithm: Algorithm, bits: u32) -> Result<Self> {
        let inner = match algorithm {
            Algorithm::Rsa => {
                let e = openssl::bn::BigNum::from_u32(RSA_PUBLIC_EXPONENT)?;
                PKey::from_rsa(openssl::rsa::Rsa::generate_with_e(bits, &e)?)?
            }
            Algorithm::Dsa => PKey::from_dsa(openssl::dsa::Dsa::generate(bits)?)?,
            algorithm => {
                return Err(Error::NotSupported(format!(
                    "{} key generation",
                    algorithm
                )));
            }
        };
        Ok(PrivateKey { inner })
    }

    /// Load a PEM encoded private key. If the key is encrypted, the given
    /// passphrase is used, or one is prompted for if none was provided.
    pub fn from_pem<P: AsRef<Path>>(
        path: P,
        encrypted: bool,
        passphrase: Option<&str>,
    ) -> Result<Self> {
        let data = read_key_file(path)?;
        Ok(PrivateKey {
            inner: match encrypted {
                false => PKey::private_key_from_pem(data.as_slice())?,
                true => {
                    let passphrase = cli::MaybePromptedString::new(
                        passphrase,
                        cli::Stream::Stdin,
                        cli::Stream::Stderr,
                        PASSPHRASE_PROMPT,
                        true,
                        false,
                    )?
                    .into_inner();
                    PKey::private_key_from_pem_passphrase(data.as_slice(), passphrase.as_bytes())?
                }
            },
        })
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        algorithm_of(self.inner.as_ref())
    }

    pub fn bits(&self) -> usize {
        self.inner.bits() as usize
    }

    pub fn rsa(&self) -> Result<openssl::rsa::Rsa<Private>> {
        Ok(self.inner.rsa()?)
    }

    pub fn dsa(&self) -> Result<openssl::dsa::Dsa<Private>> {
        Ok(self.inner.dsa()?)
    }

    pub fn to_public_key(&self) -> Result<PublicKey> {
        let der = self.inner.public_key_to_der()?;
        Ok(PublicKey {
            inner: PKey::public_key_from_der(der.as_slice())?,
        })
    }

    pub fn to_pem(&self) -> Result<Vec<u8>> {
        Ok(self.inner.private_key_to_pem_pkcs8()?)
    }
}
