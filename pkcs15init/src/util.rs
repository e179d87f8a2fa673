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
use bdrck::cli;
use std::fmt;

/// Which of a PIN policy's two secret slots a value belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SecretKind {
    Pin,
    Puk,
}

impl SecretKind {
    pub(crate) fn slot(&self) -> usize {
        match *self {
            SecretKind::Pin => 0,
            SecretKind::Puk => 1,
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match *self {
                SecretKind::Pin => "PIN",
                SecretKind::Puk => "PUK",
            }
        )
    }
}

/// The interface through which the provisioning engine asks an operator for
/// PINs and PUKs it doesn't already know.
pub trait SecretPrompter {
    /// Prompt for the given kind of secret, belonging to the PIN policy with
    /// the given identifier and label. Implementations keep asking until they
    /// get a value whose length is within the given bounds (a `max_length` of
    /// zero means there is no upper bound), or until input is exhausted.
    fn prompt_secret(
        &mut self,
        kind: SecretKind,
        ident: &str,
        label: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<String>;
}

/// Check a secret's length against a PIN policy's bounds, returning the
/// message to show the operator if it doesn't fit.
pub fn check_secret_length(
    secret: &str,
    min_length: usize,
    max_length: usize,
) -> std::result::Result<(), String> {
    let length = secret.chars().count();
    if length < min_length {
        return Err(format!(
            "Password too short ({} characters min)",
            min_length
        ));
    }
    if max_length != 0 && length > max_length {
        return Err(format!(
            "Password too long ({} characters max)",
            max_length
        ));
    }
    Ok(())
}

pub fn secret_prompt(kind: SecretKind, ident: &str, label: &str) -> String {
    match label.is_empty() {
        false => format!("Please enter {} for {} ({}): ", kind, ident, label),
        true => format!("Please enter {} for {}: ", kind, ident),
    }
}

/// A SecretPrompter which reads secrets from the controlling terminal,
/// without echoing them.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl SecretPrompter for TerminalPrompter {
    fn prompt_secret(
        &mut self,
        kind: SecretKind,
        ident: &str,
        label: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<String> {
        let prompt = secret_prompt(kind, ident, label);
        loop {
            let secret = cli::MaybePromptedString::new(
                None,
                cli::Stream::Stdin,
                cli::Stream::Stderr,
                prompt.as_str(),
                true,
                false,
            )?
            .into_inner();

            // An empty line is what we get once stdin is exhausted.
            if secret.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "no {} entered for {}",
                    kind, ident
                )));
            }

            match check_secret_length(secret.as_str(), min_length, max_length) {
                Ok(_) => return Ok(secret),
                Err(message) => eprintln!("{}", message),
            }
        }
    }
}

pub fn get_required_as<T: Clone + Copy, R: From<T>>(data: &[T], index: usize) -> Result<R> {
    Ok(match data.get(index) {
        None => {
            return Err(Error::Decode(format!(
                "the provided slice has only {} items, expected at least {}",
                data.len(),
                index + 1
            )));
        }
        Some(item) => (*item).into(),
    })
}

pub fn get_required<T: Clone + Copy>(data: &[T], index: usize) -> Result<T> {
    get_required_as::<T, T>(data, index)
}
