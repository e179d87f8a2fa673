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

use crate::card::acl::Operation;
use crate::card::file::FileDescriptor;
use crate::card::path::Path;
use crate::card::Card;
use crate::error::*;
use crate::init::auth::authenticate;
use crate::init::Session;
use log::{debug, info};

/// Select the parent DF of the given file, creating it (and in turn its own
/// missing ancestors) from the profile if it doesn't exist yet.
fn select_parent<C: Card>(session: &mut Session<C>, file: &FileDescriptor) -> Result<FileDescriptor> {
    let path: Path = file.path.parent();
    match session.card_mut().select_file(&path) {
        Err(Error::FileNotFound(_)) if !path.is_master_file() => {
            let parent = match session.profile().find_file_by_path(&path) {
                None => {
                    return Err(Error::ObjectNotFound(format!(
                        "{} doesn't exist, and the profile doesn't describe it",
                        path
                    )));
                }
                Some(parent) => parent.clone(),
            };
            info!("Creating missing directory {}", path);
            create_file(session, &parent)?;
            session.card_mut().select_file(&path)
        }
        r => r,
    }
}

/// Create the given file on the card, after satisfying its parent's CREATE
/// ACL. Missing ancestors are created first.
pub fn create_file<C: Card>(session: &mut Session<C>, file: &FileDescriptor) -> Result<()> {
    let parent = select_parent(session, file)?;
    authenticate(session, &parent, Operation::Create)?;
    debug!("Creating {} ({} bytes)", file.path, file.size);
    session.card_mut().create_file(file)
}

/// Replace the contents of the given file, creating it (large enough to hold
/// the data) if it doesn't exist yet.
pub fn update_file<C: Card>(
    session: &mut Session<C>,
    file: &FileDescriptor,
    data: &[u8],
) -> Result<()> {
    let mut file = file.clone();
    if let Err(e) = session.card_mut().select_file(&file.path) {
        match e {
            Error::FileNotFound(_) => {
                if file.size < data.len() {
                    file.size = data.len();
                }
                create_file(session, &file)?;
                session.card_mut().select_file(&file.path)?;
            }
            e => return Err(e),
        }
    }

    authenticate(session, &file, Operation::Update)?;
    debug!("Writing {} bytes to {}", data.len(), file.path);
    session.card_mut().update_binary(0, data)
}

/// Read the entire contents of the given file, after satisfying its READ ACL.
pub fn read_file<C: Card>(session: &mut Session<C>, path: &Path) -> Result<(FileDescriptor, Vec<u8>)> {
    let file = session.card_mut().select_file(path)?;
    authenticate(session, &file, Operation::Read)?;
    let data = session.card_mut().read_binary(0, file.size)?;
    Ok((file, data))
}
