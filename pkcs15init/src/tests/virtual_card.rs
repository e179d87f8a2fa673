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

use crate::card::acl::AclMethod;
use crate::card::path::Path;
use crate::card::virtual_card::VirtualCard;
use crate::card::Card;
use crate::crypto::Algorithm;
use crate::error::*;
use crate::init::generate::KeyGeneration;
use crate::init::key::KeyRequest;
use crate::init::{PinArgs, Pkcs15Init};
use crate::pkcs15::asn1::split_records;
use crate::pkcs15::decode::decode_directory;
use crate::pkcs15::*;
use crate::profile::loader::VIRTUAL_PROFILE;
use crate::profile::Profile;
use crate::tests::stub::{path, ScriptedPrompter, TEST_SERIAL_NUMBER};
use crate::tests::util::temp_path;

fn pin_args(pin1: &str) -> PinArgs {
    PinArgs {
        pin1: Some(pin1.to_owned()),
        puk1: Some("12345678".to_owned()),
        pin2: Some("5678".to_owned()),
        puk2: None,
    }
}

fn new_virtual_init<'a>(card: &'a mut VirtualCard, pin1: &str) -> Pkcs15Init<&'a mut VirtualCard> {
    let (prompter, _) = ScriptedPrompter::new(&[]);
    let mut init = Pkcs15Init::new(
        card,
        Profile::from_toml_str(VIRTUAL_PROFILE).unwrap(),
        Box::new(prompter),
    )
    .unwrap();
    init.set_pins_from_args(&pin_args(pin1));
    init
}

/// Create the application, and one software generated key, on the card.
fn provision(card: &mut VirtualCard) {
    let mut init = new_virtual_init(card, "1234");
    init.add_application().unwrap();

    let mut request = KeyRequest::new(Algorithm::Rsa, 1024);
    request.onboard_keygen = true;
    assert_eq!(
        KeyGeneration::SoftwareFallback,
        init.generate_key(&mut request).unwrap()
    );
    assert!(!request.onboard_keygen);
    assert_eq!(Some("45".parse::<Pkcs15Id>().unwrap()), request.id);
}

#[test]
fn test_operations_require_lock() {
    let mut card = VirtualCard::new();
    match card.select_file(&Path::master_file()) {
        Err(Error::Internal(_)) => {}
        r => panic!("Unexpected result: {:?}", r),
    }
}

#[test]
fn test_provisioning() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    {
        let mut init = new_virtual_init(&mut card, "1234");
        assert_eq!("virtual", init.operations().name());
        init.add_application().unwrap();
        assert_eq!(
            Some(TEST_SERIAL_NUMBER),
            init.p15card().token_info.serial_number.as_deref()
        );
        assert_eq!(2, init.p15card().count_objects(ObjectType::AuthPin));

        let mut request = KeyRequest::new(Algorithm::Rsa, 1024);
        request.onboard_keygen = true;
        assert!(init.generate_key(&mut request).unwrap().is_fallback());
        assert_eq!(1, init.p15card().count_objects(ObjectType::PrivateKeyRsa));
        assert_eq!(1, init.p15card().count_objects(ObjectType::PublicKeyRsa));
    }

    for file in &[
        "3F00/5015",
        "3F00/5015/5031",
        "3F00/5015/5032",
        "3F00/5015/4401",
        "3F00/5015/4402",
        "3F00/5015/4403",
        "3F00/5015/3000",
        "3F00/5015/3100",
    ] {
        assert!(card.file_exists(&path(file)), "{} is missing", file);
    }
    assert!(!card.file_exists(&path("3F00/5015/3001")));

    // The session is over, so nothing is verified any more.
    assert!(!card.is_verified(AclMethod::Chv, 1));
    assert_eq!(Some(0x30), card.file_content(&path("3F00/5015/3000")).map(|c| c[0]));
}

#[test]
fn test_private_key_files_are_unreadable() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);

    card.lock().unwrap();
    card.verify(AclMethod::Chv, 1, b"1234").unwrap();
    card.select_file(&path("3F00/5015/3000")).unwrap();
    match card.read_binary(0, 16) {
        Err(Error::SecurityStatusNotSatisfied(_)) => {}
        r => panic!("Unexpected result: {:?}", r),
    }
    card.select_file(&path("3F00/5015/3100")).unwrap();
    assert_eq!(16, card.read_binary(0, 16).unwrap().len());
    card.unlock();
}

#[test]
fn test_wrong_pin() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);
    let stored = card.file_content(&path("3F00/5015/3000")).map(|c| c.to_vec());

    {
        // Without binding, the new key is allocated over the existing one's file.
        let mut init = new_virtual_init(&mut card, "9999");
        let mut request = KeyRequest::new(Algorithm::Rsa, 1024);
        match init.generate_key(&mut request) {
            Err(Error::Authentication(_)) => {}
            r => panic!("Unexpected result: {:?}", r),
        }
        assert!(!init.session().is_presented(AclMethod::Chv, 1));
        assert_eq!(0, init.p15card().count_objects(ObjectType::PrivateKeyRsa));
    }
    assert_eq!(
        stored,
        card.file_content(&path("3F00/5015/3000")).map(|c| c.to_vec())
    );
}

#[test]
fn test_pin_blocking() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);

    card.lock().unwrap();
    for _ in 0..3 {
        assert!(card.verify(AclMethod::Chv, 1, b"0000").is_err());
    }
    match card.verify(AclMethod::Chv, 1, b"1234") {
        Err(Error::Authentication(message)) => assert!(message.contains("blocked")),
        r => panic!("Unexpected result: {:?}", r),
    }
    card.unlock();
}

#[test]
fn test_extend_existing_structure() {
    let card_path = temp_path("card.img");
    {
        let mut card = VirtualCard::open(&card_path).unwrap();
        provision(&mut card);
        card.flush().unwrap();
    }

    let mut card = VirtualCard::open(&card_path).unwrap();
    {
        let mut init = new_virtual_init(&mut card, "1234");
        init.bind().unwrap();
        assert_eq!(2, init.p15card().count_objects(ObjectType::AuthPin));
        assert_eq!(1, init.p15card().count_objects(ObjectType::PrivateKeyRsa));

        let mut request = KeyRequest::new(Algorithm::Rsa, 1024);
        assert_eq!(
            KeyGeneration::Software,
            init.generate_key(&mut request).unwrap()
        );
        assert_eq!(Some("46".parse::<Pkcs15Id>().unwrap()), request.id);
        let key = init
            .p15card()
            .find_object(ObjectType::PrivateKeyRsa, &"46".parse().unwrap())
            .unwrap();
        assert_eq!(
            Some(path("3F00/5015/3001")),
            key.key_info().map(|info| info.path.clone())
        );
    }
    assert!(card.file_exists(&path("3F00/5015/3101")));
    std::fs::remove_file(&card_path).unwrap();
}

#[test]
fn test_rsa_and_dsa_keys_get_separate_files() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);
    {
        let mut init = new_virtual_init(&mut card, "1234");
        init.bind().unwrap();
        let mut request = KeyRequest::new(Algorithm::Dsa, 1024);
        init.generate_key(&mut request).unwrap();
        let key = init
            .p15card()
            .objects(ObjectType::PrivateKeyDsa)
            .next()
            .unwrap();
        assert_eq!(
            Some(path("3F00/5015/3080")),
            key.key_info().map(|info| info.path.clone())
        );
    }
    assert!(card.file_exists(&path("3F00/5015/3180")));

    // The RSA key stored first must not have been overwritten.
    let records = split_records(card.file_content(&path("3F00/5015/3000")).unwrap()).unwrap();
    assert!(openssl::rsa::Rsa::private_key_from_der(records[0].1).is_ok());
    let records = split_records(card.file_content(&path("3F00/5015/3080")).unwrap()).unwrap();
    assert!(openssl::pkey::PKey::private_key_from_der(records[0].1)
        .and_then(|k| k.dsa())
        .is_ok());
}

#[test]
fn test_bind_keeps_unsupported_records() {
    let ec_record = [0xa0, 0x05, 0x30, 0x03, 0x0c, 0x01, b'E'];
    let prkdf = path("3F00/5015/4402");
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);

    let existing = card.file_content(&prkdf).unwrap().to_vec();
    let used: usize = split_records(existing.as_slice())
        .unwrap()
        .iter()
        .map(|(_, der)| der.len())
        .sum();
    card.lock().unwrap();
    card.verify(AclMethod::Chv, 1, b"1234").unwrap();
    card.select_file(&prkdf).unwrap();
    card.update_binary(0, &[&ec_record[..], &existing[..used]].concat())
        .unwrap();
    card.unlock();

    {
        let mut init = new_virtual_init(&mut card, "1234");
        init.bind().unwrap();
        assert_eq!(1, init.p15card().count_objects(ObjectType::PrivateKeyRsa));
        init.generate_key(&mut KeyRequest::new(Algorithm::Rsa, 1024))
            .unwrap();
    }

    let content = card.file_content(&prkdf).unwrap();
    assert_eq!(&ec_record[..], &content[..ec_record.len()]);
    assert_eq!(2, decode_directory(DfKind::PrKdf, content).unwrap().len());
}

#[test]
fn test_bind_blank_card() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    let mut init = new_virtual_init(&mut card, "1234");
    match init.bind() {
        Err(Error::ObjectNotFound(message)) => assert!(message.contains("run init first")),
        r => panic!("Unexpected result: {:?}", r),
    }
}

#[test]
fn test_erase() {
    let mut card = VirtualCard::with_serial_number(TEST_SERIAL_NUMBER);
    provision(&mut card);
    {
        let mut init = new_virtual_init(&mut card, "1234");
        init.erase_card().unwrap();
        assert_eq!(0, init.p15card().count_objects(ObjectType::AuthPin));
    }
    assert!(!card.file_exists(&path("3F00/5015")));
    assert!(card.file_exists(&Path::master_file()));
}
