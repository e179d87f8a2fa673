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

pub mod asn1;
pub mod decode;
pub mod encode;

use crate::card::file::FileDescriptor;
use crate::card::path::Path;
use crate::crypto::Algorithm;
use crate::error::*;
use data_encoding::{HEXUPPER, HEXUPPER_PERMISSIVE};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// PKCS#15 identifiers are OCTET STRINGs of at most this many bytes.
pub const MAX_ID_LENGTH: usize = 255;

/// The identifier new key objects start from when neither the request nor
/// the template provide one.
pub const DEFAULT_KEY_ID: &[u8] = &[0x45];

/// A PKCS#15 object identifier.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Pkcs15Id(Vec<u8>);

impl Pkcs15Id {
    pub fn new(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_ID_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "PKCS#15 identifiers are at most {} bytes, got {}",
                MAX_ID_LENGTH,
                bytes.len()
            )));
        }
        Ok(Pkcs15Id(bytes.to_vec()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a copy of this identifier with `offset` added (modulo 256) to
    /// its last byte.
    pub fn with_offset(&self, offset: usize) -> Pkcs15Id {
        let mut bytes = self.0.clone();
        if let Some(last) = bytes.last_mut() {
            *last = last.wrapping_add((offset % 256) as u8);
        }
        Pkcs15Id(bytes)
    }
}

impl fmt::Display for Pkcs15Id {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", HEXUPPER.encode(self.0.as_slice()))
    }
}

impl FromStr for Pkcs15Id {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Pkcs15Id::new(HEXUPPER_PERMISSIVE.decode(s.trim().as_bytes())?.as_slice())
    }
}

macro_rules! named_bits {
    ($(#[$meta:meta])* $name:ident { $($constant:ident = ($bit:expr, $label:expr)),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $constant: $name = $name(1 << $bit);)*

            const NAMES: &'static [(&'static str, u32)] = &[$(($label, $bit)),*];

            pub fn bits(&self) -> u32 {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == 0
            }

            pub fn contains(&self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            /// Build a flag set from the standard's names for its bits
            /// (e.g. "sign", "nonRepudiation"). Matching ignores case and
            /// dashes.
            pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
                let mut bits = 0;
                for name in names {
                    let wanted = name.as_ref().replace('-', "").to_lowercase();
                    match Self::NAMES
                        .iter()
                        .find(|(label, _)| label.replace('-', "").to_lowercase() == wanted)
                    {
                        None => {
                            return Err(Error::InvalidArgument(format!(
                                "invalid {} flag '{}'",
                                stringify!($name),
                                name.as_ref()
                            )));
                        }
                        Some((_, bit)) => bits |= 1u32 << *bit,
                    }
                }
                Ok($name(bits))
            }

            pub fn names(&self) -> Vec<&'static str> {
                Self::NAMES
                    .iter()
                    .filter(|(_, bit)| self.0 & (1u32 << *bit) != 0)
                    .map(|(label, _)| *label)
                    .collect()
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

named_bits!(
    /// KeyUsageFlags.
    KeyUsage {
        ENCRYPT = (0, "encrypt"),
        DECRYPT = (1, "decrypt"),
        SIGN = (2, "sign"),
        SIGN_RECOVER = (3, "signRecover"),
        WRAP = (4, "wrap"),
        UNWRAP = (5, "unwrap"),
        VERIFY = (6, "verify"),
        VERIFY_RECOVER = (7, "verifyRecover"),
        DERIVE = (8, "derive"),
        NON_REPUDIATION = (9, "nonRepudiation"),
    }
);

named_bits!(
    /// KeyAccessFlags.
    AccessFlags {
        SENSITIVE = (0, "sensitive"),
        EXTRACTABLE = (1, "extractable"),
        ALWAYS_SENSITIVE = (2, "alwaysSensitive"),
        NEVER_EXTRACTABLE = (3, "neverExtractable"),
        LOCAL = (4, "local"),
    }
);

named_bits!(
    /// CommonObjectFlags.
    ObjectFlags {
        PRIVATE = (0, "private"),
        MODIFIABLE = (1, "modifiable"),
    }
);

named_bits!(
    /// PinFlags.
    PinFlags {
        CASE_SENSITIVE = (0, "case-sensitive"),
        LOCAL = (1, "local"),
        CHANGE_DISABLED = (2, "change-disabled"),
        UNBLOCK_DISABLED = (3, "unblock-disabled"),
        INITIALIZED = (4, "initialized"),
        NEEDS_PADDING = (5, "needs-padding"),
        UNBLOCKING_PIN = (6, "unblockingPin"),
        SO_PIN = (7, "soPin"),
        DISABLE_ALLOWED = (8, "disable-allowed"),
        INTEGRITY_PROTECTED = (9, "integrity-protected"),
        CONFIDENTIALITY_PROTECTED = (10, "confidentiality-protected"),
        EXCHANGE_REF_DATA = (11, "exchangeRefData"),
    }
);

named_bits!(
    /// TokenFlags.
    TokenFlags {
        READONLY = (0, "readonly"),
        LOGIN_REQUIRED = (1, "loginRequired"),
        PRN_GENERATION = (2, "prnGeneration"),
        EID_COMPLIANT = (3, "eidCompliant"),
    }
);

/// The PinType enumeration.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum PinType {
    Bcd,
    #[default]
    AsciiNumeric,
    Utf8,
    HalfNibbleBcd,
    Iso9564_1,
}

impl PinType {
    pub fn to_u8(&self) -> u8 {
        match *self {
            PinType::Bcd => 0,
            PinType::AsciiNumeric => 1,
            PinType::Utf8 => 2,
            PinType::HalfNibbleBcd => 3,
            PinType::Iso9564_1 => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PinType::Bcd,
            1 => PinType::AsciiNumeric,
            2 => PinType::Utf8,
            3 => PinType::HalfNibbleBcd,
            4 => PinType::Iso9564_1,
            _ => return Err(Error::Decode(format!("invalid PIN type {}", value))),
        })
    }
}

impl FromStr for PinType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_lowercase().as_str() {
            "bcd" => PinType::Bcd,
            "ascii-numeric" => PinType::AsciiNumeric,
            "utf8" => PinType::Utf8,
            "half-nibble-bcd" => PinType::HalfNibbleBcd,
            "iso9564-1" => PinType::Iso9564_1,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "invalid PIN type '{}'",
                    s
                )));
            }
        })
    }
}

/// The kinds of directory file the ODF can point at.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum DfKind {
    PrKdf,
    PuKdf,
    TrustedPuKdf,
    SKdf,
    Cdf,
    TrustedCdf,
    UsefulCdf,
    DoDf,
    AoDf,
}

pub const ALL_DF_KINDS: [DfKind; 9] = [
    DfKind::PrKdf,
    DfKind::PuKdf,
    DfKind::TrustedPuKdf,
    DfKind::SKdf,
    DfKind::Cdf,
    DfKind::TrustedCdf,
    DfKind::UsefulCdf,
    DfKind::DoDf,
    DfKind::AoDf,
];

impl DfKind {
    /// This kind's context tag number in the ODF's PKCS15Objects CHOICE.
    pub fn odf_tag_number(&self) -> u8 {
        match *self {
            DfKind::PrKdf => 0,
            DfKind::PuKdf => 1,
            DfKind::TrustedPuKdf => 2,
            DfKind::SKdf => 3,
            DfKind::Cdf => 4,
            DfKind::TrustedCdf => 5,
            DfKind::UsefulCdf => 6,
            DfKind::DoDf => 7,
            DfKind::AoDf => 8,
        }
    }

    /// The profile file identifier which declares this kind's file.
    pub fn profile_ident(&self) -> &'static str {
        match *self {
            DfKind::PrKdf => "PKCS15-PrKDF",
            DfKind::PuKdf => "PKCS15-PuKDF",
            DfKind::TrustedPuKdf => "PKCS15-PuKDF-TRUSTED",
            DfKind::SKdf => "PKCS15-SKDF",
            DfKind::Cdf => "PKCS15-CDF",
            DfKind::TrustedCdf => "PKCS15-CDF-TRUSTED",
            DfKind::UsefulCdf => "PKCS15-CDF-USEFUL",
            DfKind::DoDf => "PKCS15-DODF",
            DfKind::AoDf => "PKCS15-AODF",
        }
    }
}

impl fmt::Display for DfKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                DfKind::PrKdf => "PrKDF",
                DfKind::PuKdf => "PuKDF",
                DfKind::TrustedPuKdf => "trusted PuKDF",
                DfKind::SKdf => "SKDF",
                DfKind::Cdf => "CDF",
                DfKind::TrustedCdf => "trusted CDF",
                DfKind::UsefulCdf => "useful CDF",
                DfKind::DoDf => "DODF",
                DfKind::AoDf => "AODF",
            }
        )
    }
}

/// The PKCS#15 type of an object.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ObjectType {
    PrivateKeyRsa,
    PrivateKeyDsa,
    PublicKeyRsa,
    PublicKeyDsa,
    AuthPin,
}

impl ObjectType {
    /// The key object type for the given algorithm and privacy.
    pub fn for_key(algorithm: Algorithm, private: bool) -> Result<Self> {
        Ok(match (algorithm, private) {
            (Algorithm::Rsa, true) => ObjectType::PrivateKeyRsa,
            (Algorithm::Dsa, true) => ObjectType::PrivateKeyDsa,
            (Algorithm::Rsa, false) => ObjectType::PublicKeyRsa,
            (Algorithm::Dsa, false) => ObjectType::PublicKeyDsa,
            (algorithm, _) => {
                return Err(Error::NotSupported(format!(
                    "{} keys can't be stored in PKCS#15 key objects",
                    algorithm
                )));
            }
        })
    }

    pub fn is_private_key(&self) -> bool {
        matches!(*self, ObjectType::PrivateKeyRsa | ObjectType::PrivateKeyDsa)
    }

    pub fn is_public_key(&self) -> bool {
        matches!(*self, ObjectType::PublicKeyRsa | ObjectType::PublicKeyDsa)
    }

    /// The directory file objects of this type are registered in.
    pub fn directory(&self) -> DfKind {
        match *self {
            ObjectType::PrivateKeyRsa | ObjectType::PrivateKeyDsa => DfKind::PrKdf,
            ObjectType::PublicKeyRsa | ObjectType::PublicKeyDsa => DfKind::PuKdf,
            ObjectType::AuthPin => DfKind::AoDf,
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                ObjectType::PrivateKeyRsa => "RSA private key",
                ObjectType::PrivateKeyDsa => "DSA private key",
                ObjectType::PublicKeyRsa => "RSA public key",
                ObjectType::PublicKeyDsa => "DSA public key",
                ObjectType::AuthPin => "PIN",
            }
        )
    }
}

/// CommonObjectAttributes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommonAttributes {
    pub label: String,
    pub flags: ObjectFlags,
    pub auth_id: Option<Pkcs15Id>,
}

/// The attributes of a private or public key object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyInfo {
    pub id: Pkcs15Id,
    pub usage: KeyUsage,
    pub native: bool,
    pub access_flags: AccessFlags,
    pub key_reference: Option<u32>,
    pub path: Path,
    /// The modulus (RSA) or prime (DSA) length in bits.
    pub modulus_length: usize,
}

/// The attributes of a PIN authentication object.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PinInfo {
    pub auth_id: Pkcs15Id,
    pub flags: PinFlags,
    pub pin_type: PinType,
    pub min_length: usize,
    pub stored_length: usize,
    pub max_length: Option<usize>,
    pub reference: u32,
    pub pad_char: Option<u8>,
    pub path: Option<Path>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ObjectData {
    Key(KeyInfo),
    Pin(PinInfo),
}

/// One record in a directory file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pkcs15Object {
    pub object_type: ObjectType,
    pub common: CommonAttributes,
    pub data: ObjectData,
}

impl Pkcs15Object {
    /// An object's identifier: the key ID for keys, the auth ID for PINs.
    pub fn id(&self) -> &Pkcs15Id {
        match self.data {
            ObjectData::Key(ref info) => &info.id,
            ObjectData::Pin(ref info) => &info.auth_id,
        }
    }

    pub fn key_info(&self) -> Option<&KeyInfo> {
        match self.data {
            ObjectData::Key(ref info) => Some(info),
            ObjectData::Pin(_) => None,
        }
    }

    pub fn pin_info(&self) -> Option<&PinInfo> {
        match self.data {
            ObjectData::Pin(ref info) => Some(info),
            ObjectData::Key(_) => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Record {
    segment: usize,
    object: Pkcs15Object,
}

/// A directory file: the card files backing it (its segments), and the
/// records stored in each.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Directory {
    kind: DfKind,
    files: Vec<FileDescriptor>,
    records: Vec<Record>,
    opaque_records: Vec<(usize, Vec<u8>)>,
}

impl Directory {
    fn new(kind: DfKind) -> Self {
        Directory {
            kind,
            files: Vec::new(),
            records: Vec::new(),
            opaque_records: Vec::new(),
        }
    }

    pub fn kind(&self) -> DfKind {
        self.kind
    }

    pub fn files(&self) -> &[FileDescriptor] {
        self.files.as_slice()
    }

    pub fn objects(&self) -> impl Iterator<Item = &Pkcs15Object> {
        self.records.iter().map(|r| &r.object)
    }

    /// The objects stored in the given segment, in registration order.
    pub fn segment_objects(&self, segment: usize) -> impl Iterator<Item = &Pkcs15Object> {
        self.records
            .iter()
            .filter(move |r| r.segment == segment)
            .map(|r| &r.object)
    }

    /// The DER of records read from the given segment which aren't modeled
    /// as objects.
    pub fn segment_opaque_records(&self, segment: usize) -> impl Iterator<Item = &[u8]> {
        self.opaque_records
            .iter()
            .filter(move |(s, _)| *s == segment)
            .map(|(_, der)| der.as_slice())
    }
}

/// TokenInfo.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TokenInfo {
    pub version: u32,
    /// The serial number, as hex digits.
    pub serial_number: Option<String>,
    pub manufacturer_id: Option<String>,
    pub label: Option<String>,
    pub flags: TokenFlags,
}

/// The in-memory image of a card's PKCS#15 structure. Records are only ever
/// appended.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Pkcs15Card {
    pub token_info: TokenInfo,
    directories: BTreeMap<DfKind, Directory>,
}

impl Pkcs15Card {
    pub fn new(token_info: TokenInfo) -> Self {
        Pkcs15Card {
            token_info,
            directories: BTreeMap::new(),
        }
    }

    pub fn directory(&self, kind: DfKind) -> Option<&Directory> {
        self.directories.get(&kind)
    }

    pub fn directories(&self) -> impl Iterator<Item = &Directory> {
        self.directories.values()
    }

    /// The card files backing the given kind of directory.
    pub fn directory_files(&self, kind: DfKind) -> &[FileDescriptor] {
        self.directories.get(&kind).map_or(&[], |d| d.files())
    }

    /// Add a backing file to the given directory, returning its segment index.
    pub fn bind_directory_file(&mut self, kind: DfKind, file: FileDescriptor) -> usize {
        let directory = self
            .directories
            .entry(kind)
            .or_insert_with(|| Directory::new(kind));
        directory.files.push(file);
        directory.files.len() - 1
    }

    /// Register an object in the given segment of the directory for its type.
    pub fn add_object_to_segment(&mut self, segment: usize, object: Pkcs15Object) {
        let kind = object.object_type.directory();
        self.directories
            .entry(kind)
            .or_insert_with(|| Directory::new(kind))
            .records
            .push(Record { segment, object });
    }

    /// Keep a record of a type this crate doesn't model, so it survives the
    /// segment being rewritten.
    pub fn add_opaque_record(&mut self, kind: DfKind, segment: usize, der: Vec<u8>) {
        self.directories
            .entry(kind)
            .or_insert_with(|| Directory::new(kind))
            .opaque_records
            .push((segment, der));
    }

    /// Register an object in the first segment of the directory for its type.
    pub fn add_object(&mut self, object: Pkcs15Object) {
        self.add_object_to_segment(0, object)
    }

    pub fn objects(&self, object_type: ObjectType) -> impl Iterator<Item = &Pkcs15Object> {
        self.directories
            .get(&object_type.directory())
            .into_iter()
            .flat_map(|d| d.objects())
            .filter(move |o| o.object_type == object_type)
    }

    pub fn count_objects(&self, object_type: ObjectType) -> usize {
        self.objects(object_type).count()
    }

    pub fn find_object(&self, object_type: ObjectType, id: &Pkcs15Id) -> Option<&Pkcs15Object> {
        self.objects(object_type).find(|o| o.id() == id)
    }
}
