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

pub mod card;
pub mod crypto;
pub mod driver;
pub mod error;
pub mod init;
pub mod pkcs15;
pub mod profile;
pub mod util;

#[cfg(test)]
mod tests;

/// This function must be called before any other pkcs15init functions are
/// used, to set up the underlying cryptographic library.
pub fn init() -> crate::error::Result<()> {
    openssl::init();
    Ok(())
}
