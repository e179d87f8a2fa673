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

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use pkcs15init::card::virtual_card::VirtualCard;
use pkcs15init::crypto::{Format, KeySpec, PrivateKey, PublicKey};
use pkcs15init::driver::bind_operations;
use pkcs15init::init::key::{KeyObject, KeyRequest};
use pkcs15init::init::{PinArgs, Pkcs15Init};
use pkcs15init::pkcs15::Pkcs15Id;
use pkcs15init::profile::loader::VIRTUAL_PROFILE;
use pkcs15init::profile::Profile;
use pkcs15init::util::TerminalPrompter;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

const DEFAULT_CARD_IMAGE: &str = "pkcs15-card.img";

/// Values which may come from either the command line or an options file.
#[derive(Default)]
struct Options {
    pins: PinArgs,
    passphrase: Option<String>,
    label: Option<String>,
    id: Option<String>,
}

impl Options {
    fn set(&mut self, name: &str, value: String) -> Result<()> {
        let slot = match name {
            "pin1" => &mut self.pins.pin1,
            "puk1" => &mut self.pins.puk1,
            "pin2" => &mut self.pins.pin2,
            "puk2" => &mut self.pins.puk2,
            "passphrase" => &mut self.passphrase,
            "label" => &mut self.label,
            "id" => &mut self.id,
            _ => bail!("unknown option '{}' in options file", name),
        };
        *slot = Some(value);
        Ok(())
    }

    /// Fill in anything not given on the command line from the given file.
    /// Each line holds an option name followed by its value; `#` starts a
    /// comment.
    fn read_file(&mut self, path: &Path) -> Result<()> {
        let mut from_file = Options::default();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to open {}", path.display()))?;
        for line in contents.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, value) = match line.find(char::is_whitespace) {
                None => (line, ""),
                Some(split) => (&line[..split], line[split..].trim()),
            };
            if value.is_empty() {
                bail!("option {}: missing argument", name);
            }
            from_file.set(name.trim_start_matches("--"), value.to_owned())?;
        }

        let pins = &mut self.pins;
        pins.pin1 = pins.pin1.take().or(from_file.pins.pin1);
        pins.puk1 = pins.puk1.take().or(from_file.pins.puk1);
        pins.pin2 = pins.pin2.take().or(from_file.pins.pin2);
        pins.puk2 = pins.puk2.take().or(from_file.pins.puk2);
        self.passphrase = self.passphrase.take().or(from_file.passphrase);
        self.label = self.label.take().or(from_file.label);
        self.id = self.id.take().or(from_file.id);
        Ok(())
    }
}

fn load_profile(paths: &[PathBuf]) -> Result<Profile> {
    Ok(match paths.is_empty() {
        true => Profile::from_toml_str(VIRTUAL_PROFILE)?,
        false => Profile::load(paths).context("failed to load the provisioning profile")?,
    })
}

/// Open the card image, run the given action against a provisioning engine
/// bound to it, and save the image afterwards.
fn with_card<F>(common: &CommonArgs, options: &Options, action: F) -> Result<()>
where
    F: FnOnce(&mut Pkcs15Init<&mut VirtualCard>) -> Result<()>,
{
    let profile = load_profile(common.profile.as_slice())?;
    let mut card = VirtualCard::open(&common.card_image)
        .with_context(|| format!("failed to open card image {}", common.card_image.display()))?;

    let result = {
        let prompter = Box::new(TerminalPrompter);
        let mut init = match common.driver.as_ref() {
            None => Pkcs15Init::new(&mut card, profile, prompter)?,
            Some(driver) => {
                Pkcs15Init::with_operations(&mut card, profile, prompter, bind_operations(driver)?)?
            }
        };
        debug!("Using the {} capability driver", init.operations().name());
        init.set_pins_from_args(&options.pins);
        action(&mut init)
    };

    // Whatever was written before a failure is on the card now, just as it
    // would be on real hardware.
    card.flush()?;
    result
}

fn print_key(key: &KeyObject, quiet: bool) {
    if !quiet {
        println!("Stored key {} in {}", key.id(), key.file().path);
    }
}

fn apply_key_options(request: &mut KeyRequest, options: &Options) -> Result<()> {
    if let Some(id) = options.id.as_ref() {
        request.id = Some(
            id.parse::<Pkcs15Id>()
                .with_context(|| format!("invalid key ID '{}'", id))?,
        );
    }
    request.label = options.label.clone();
    Ok(())
}

fn init(common: CommonArgs, options: Options, erase: bool, yes: bool) -> Result<()> {
    if erase
        && !yes
        && !bdrck::cli::continue_confirmation(
            bdrck::cli::Stream::Stdin,
            bdrck::cli::Stream::Stderr,
            "This will erase all data on the card before creating the PKCS#15 structure. ",
        )?
    {
        return Ok(());
    }

    let quiet = common.quiet;
    with_card(&common, &options, |init| {
        if erase {
            init.erase_card().context("failed to erase the card")?;
        }
        init.add_application()
            .context("failed to create the PKCS#15 application")?;
        if !quiet {
            println!("Successfully created PKCS15 meta structure");
        }
        Ok(())
    })
}

fn generate_key(
    common: CommonArgs,
    options: Options,
    spec: KeySpec,
    template: Option<String>,
    onboard: bool,
    pubkey_file: Option<PathBuf>,
    key_format: Format,
) -> Result<()> {
    let quiet = common.quiet;
    let mut request = KeyRequest::new(spec.algorithm, spec.bits);
    request.template = template;
    request.onboard_keygen = onboard;
    apply_key_options(&mut request, &options)?;

    with_card(&common, &options, |init| {
        init.bind()
            .context("failed to read the card's PKCS#15 structure")?;
        let generation = init
            .generate_key(&mut request)
            .with_context(|| format!("failed to generate {} key", spec))?;
        if generation.is_fallback() && !quiet {
            println!(
                "Warning: card doesn't support on-board key generation; using software generation"
            );
        }
        info!("Generated key {:?} ({:?})", request.id, generation);

        if let Some(path) = pubkey_file.as_ref() {
            let public_key = request.resolve_public_key()?;
            fs::write(path, public_key.format(key_format)?)
                .with_context(|| format!("failed to write public key to {}", path.display()))?;
        }
        if !quiet {
            if let Some(id) = request.id.as_ref() {
                println!("Generated key {}", id);
            }
        }
        Ok(())
    })
}

fn store_key(common: CommonArgs, options: Options, file: PathBuf, encrypted: bool) -> Result<()> {
    let key = PrivateKey::from_pem(&file, encrypted, options.passphrase.as_deref())
        .with_context(|| format!("failed to read private key from {}", file.display()))?;
    let mut request = KeyRequest::for_private_key(key)?;
    apply_key_options(&mut request, &options)?;

    let quiet = common.quiet;
    with_card(&common, &options, |init| {
        init.bind()
            .context("failed to read the card's PKCS#15 structure")?;
        let private = init
            .store_private_key(&mut request)
            .context("failed to store private key")?;
        print_key(&private, quiet);
        let public = init
            .store_public_key(&mut request)
            .context("failed to store public key")?;
        print_key(&public, quiet);
        Ok(())
    })
}

fn store_public_key(common: CommonArgs, options: Options, file: PathBuf) -> Result<()> {
    let key = PublicKey::from_pem(&file)
        .with_context(|| format!("failed to read public key from {}", file.display()))?;
    let mut request = KeyRequest::for_public_key(key)?;
    apply_key_options(&mut request, &options)?;

    let quiet = common.quiet;
    with_card(&common, &options, |init| {
        init.bind()
            .context("failed to read the card's PKCS#15 structure")?;
        let public = init
            .store_public_key(&mut request)
            .context("failed to store public key")?;
        print_key(&public, quiet);
        Ok(())
    })
}

#[derive(Args)]
// Arguments common to all commands.
struct CommonArgs {
    #[arg(short = 'c', long, default_value = DEFAULT_CARD_IMAGE)]
    /// The virtual card image to provision. It is created if it doesn't exist.
    card_image: PathBuf,

    #[arg(short = 'p', long)]
    /// A provisioning profile to load. May be given more than once, in which case later profiles
    /// are layered on top of earlier ones. Defaults to the built-in virtual card profile.
    profile: Vec<PathBuf>,

    #[arg(long)]
    /// Use this card family's capability driver, instead of the one the card identifies itself as.
    driver: Option<String>,

    #[arg(long)]
    /// Read additional options (e.g. PINs) from this file, so they needn't appear on the command
    /// line.
    options_file: Option<PathBuf>,

    #[arg(short = 'q', long)]
    /// Suppress informational output.
    quiet: bool,
}

#[derive(Args)]
struct PinArgsCli {
    #[arg(long)]
    /// The PIN for CHV1 (the user PIN).
    pin1: Option<String>,
    #[arg(long)]
    /// The PUK for CHV1.
    puk1: Option<String>,
    #[arg(long)]
    /// The PIN for CHV2 (the security officer PIN).
    pin2: Option<String>,
    #[arg(long)]
    /// The PUK for CHV2.
    puk2: Option<String>,
}

#[derive(Args)]
struct KeyArgs {
    #[arg(short = 'i', long)]
    /// The hex encoded ID of the new key object. Allocated from the profile if omitted.
    id: Option<String>,

    #[arg(short = 'l', long)]
    /// The label of the new key object.
    label: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the PKCS#15 structure on the card.
    Init {
        #[arg(short = 'E', long)]
        /// Erase the card before creating the PKCS#15 structure.
        erase: bool,

        #[arg(short = 'y', long)]
        /// Don't ask for confirmation before erasing the card.
        yes: bool,

        #[command(flatten)]
        pins: PinArgsCli,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate a new key pair, storing both halves on the card.
    GenerateKey {
        /// The key to generate, e.g. "rsa/2048" or "dsa-1024".
        spec: KeySpec,

        #[arg(short = 't', long)]
        /// The profile key template to use.
        template: Option<String>,

        #[arg(long)]
        /// Generate the key on the card, falling back to software generation if the card can't.
        onboard: bool,

        #[arg(long)]
        /// Write the generated public key to this file.
        pubkey_file: Option<PathBuf>,

        #[arg(short = 'f', long, default_value_t = Format::Pem)]
        /// The format to write the public key in.
        key_format: Format,

        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        pins: PinArgsCli,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Store an existing private key (and its public half) on the card.
    StoreKey {
        /// The file containing the private key, in PEM format.
        file: PathBuf,

        #[arg(short = 'e', long)]
        /// The key is encrypted and requires a passphrase to read.
        encrypted: bool,

        #[arg(long)]
        /// The passphrase for an encrypted key. Prompted for if needed and not given.
        passphrase: Option<String>,

        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        pins: PinArgsCli,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Store an existing public key on the card.
    StorePublicKey {
        /// The file containing the public key, in PEM format.
        file: PathBuf,

        #[command(flatten)]
        key: KeyArgs,
        #[command(flatten)]
        pins: PinArgsCli,
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn build_options(
    common: &CommonArgs,
    pins: PinArgsCli,
    key: Option<KeyArgs>,
    passphrase: Option<String>,
) -> Result<Options> {
    let key = key.unwrap_or(KeyArgs {
        id: None,
        label: None,
    });
    let mut options = Options {
        pins: PinArgs {
            pin1: pins.pin1,
            puk1: pins.puk1,
            pin2: pins.pin2,
            puk2: pins.puk2,
        },
        passphrase,
        label: key.label,
        id: key.id,
    };
    if let Some(path) = common.options_file.as_ref() {
        options.read_file(path)?;
    }
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(
                    if cfg!(debug_assertions) {
                        LevelFilter::DEBUG
                    } else {
                        LevelFilter::WARN
                    }
                    .into(),
                )
                .from_env()?,
        )
        .init();

    pkcs15init::init()?;

    match Cli::parse().command {
        Commands::Init {
            erase,
            yes,
            pins,
            common,
        } => {
            let options = build_options(&common, pins, None, None)?;
            init(common, options, erase, yes)
        }
        Commands::GenerateKey {
            spec,
            template,
            onboard,
            pubkey_file,
            key_format,
            key,
            pins,
            common,
        } => {
            let options = build_options(&common, pins, Some(key), None)?;
            generate_key(
                common,
                options,
                spec,
                template,
                onboard,
                pubkey_file,
                key_format,
            )
        }
        Commands::StoreKey {
            file,
            encrypted,
            passphrase,
            key,
            pins,
            common,
        } => {
            let options = build_options(&common, pins, Some(key), passphrase)?;
            store_key(common, options, file, encrypted)
        }
        Commands::StorePublicKey {
            file,
            key,
            pins,
            common,
        } => {
            let options = build_options(&common, pins, Some(key), None)?;
            store_public_key(common, options, file)
        }
    }
}
