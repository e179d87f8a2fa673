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

use crate::card::acl::{AclEntry, AclMethod, Operation};
use crate::card::path::Path;
use crate::pkcs15::*;
use crate::util::*;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A path in the system's temporary directory which no other test uses. The
/// file isn't created.
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "pkcs15init-{}-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::SeqCst),
        name
    ))
}

#[test]
fn test_check_secret_length() {
    assert!(check_secret_length("1234", 4, 8).is_ok());
    assert!(check_secret_length("12345678", 4, 8).is_ok());
    assert_eq!(
        Err("Password too short (4 characters min)".to_owned()),
        check_secret_length("123", 4, 8)
    );
    assert_eq!(
        Err("Password too long (8 characters max)".to_owned()),
        check_secret_length("123456789", 4, 8)
    );
    assert!(check_secret_length("a very long passphrase", 4, 0).is_ok());
}

#[test]
fn test_secret_prompt() {
    assert_eq!(
        "Please enter PIN for CHV1 (User PIN): ",
        secret_prompt(SecretKind::Pin, "CHV1", "User PIN")
    );
    assert_eq!(
        "Please enter PUK for CHV2: ",
        secret_prompt(SecretKind::Puk, "CHV2", "")
    );
}

#[test]
fn test_path() {
    let path: Path = "3F00/5015/4401".parse().unwrap();
    assert_eq!(&[0x3f, 0x00, 0x50, 0x15, 0x44, 0x01], path.as_bytes());
    assert_eq!("3F00/5015/4401", path.to_string());
    assert_eq!(path, "3f0050154401".parse().unwrap());
    assert_eq!(0x4401, path.file_id());
    assert_eq!(3, path.depth());

    let parent = path.parent();
    assert_eq!("3F00/5015", parent.to_string());
    assert_eq!(path, parent.join(0x4401));
    assert!(parent.parent().is_master_file());
    assert!(Path::master_file().parent().is_master_file());
    assert_eq!("3F00/5015/4402", path.with_file_id(0x4402).to_string());

    assert!("3F0".parse::<Path>().is_err());
    assert!("".parse::<Path>().is_err());
    assert!("3F00/XYZW".parse::<Path>().is_err());
}

#[test]
fn test_acl_entry_parsing() {
    assert_eq!(AclEntry::none(), "none".parse().unwrap());
    assert_eq!(AclEntry::never(), "NEVER".parse().unwrap());
    assert_eq!(AclEntry::chv(1), "chv:1".parse().unwrap());
    assert_eq!(
        AclEntry::new(AclMethod::Pro, 0x10),
        "pro:16".parse().unwrap()
    );
    assert_eq!("aut:2", AclEntry::new(AclMethod::Aut, 2).to_string());
    assert!("chv".parse::<AclEntry>().is_err());
    assert!("bogus:1".parse::<AclEntry>().is_err());
    assert_eq!(Operation::Update, "update".parse().unwrap());
}

#[test]
fn test_id_offset() {
    let id: Pkcs15Id = "45".parse().unwrap();
    assert_eq!("45", id.to_string());
    assert_eq!("47", id.with_offset(2).to_string());
    let id: Pkcs15Id = "01FF".parse().unwrap();
    assert_eq!("0100", id.with_offset(1).to_string());
    assert!(Pkcs15Id::default().with_offset(3).is_empty());
    assert!(Pkcs15Id::new(&[0; 256]).is_err());
}

#[test]
fn test_flag_names() {
    let usage = KeyUsage::from_names(&["sign", "Non-Repudiation"]).unwrap();
    assert_eq!(KeyUsage::SIGN | KeyUsage::NON_REPUDIATION, usage);
    assert_eq!(vec!["sign", "nonRepudiation"], usage.names());
    assert!(KeyUsage::from_names(&["fly"]).is_err());
    assert!(PinFlags::from_names::<&str>(&[]).unwrap().is_empty());
}

#[test]
fn test_dashed_flag_names() {
    assert_eq!(
        PinFlags::CASE_SENSITIVE | PinFlags::INITIALIZED,
        PinFlags::from_names(&["case-sensitive", "initialized"]).unwrap()
    );
}
