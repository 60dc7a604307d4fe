use std::env;
use std::fs;
use std::io::{self, Write};
use clap::Shell;

mod gpgmail_cli {
    include!("src/gpgmail_cli.rs");
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src/gpgmail_cli.rs");

    let mut gpgmail = gpgmail_cli::configure(
        clap::App::new("gpgmail").set_term_width(80));
    let mut main = fs::File::create("src/gpgmail-usage.rs").unwrap();
    dump_help(&mut main,
              &mut gpgmail,
              vec![],
              "#").unwrap();
    writeln!(main, "\ninclude!(\"gpgmail.rs\");").unwrap();

    let outdir = match env::var_os("CARGO_TARGET_DIR") {
        None => return,
        Some(outdir) => outdir,
    };
    fs::create_dir_all(&outdir).unwrap();
    let mut gpgmail = gpgmail_cli::build();
    for shell in &[Shell::Bash, Shell::Fish, Shell::Zsh, Shell::PowerShell,
                   Shell::Elvish] {
        gpgmail.gen_completions("gpgmail", *shell, &outdir);
    }
}

fn dump_help(sink: &mut dyn io::Write,
             gpgmail: &mut clap::App,
             cmd: Vec<String>,
             heading: &str)
             -> io::Result<()>
{
    if cmd.is_empty() {
        writeln!(sink, "//! Composes OpenPGP encrypted or signed mail.")?;
        writeln!(sink, "//!")?;
        writeln!(sink, "//! # Usage")?;
    } else {
        writeln!(sink, "//!")?;
        writeln!(sink, "//! {} Subcommand {}", heading, cmd.join(" "))?;
    }

    writeln!(sink, "//!")?;

    let args = std::iter::once("gpgmail")
        .chain(cmd.iter().map(|s| s.as_str()))
        .chain(std::iter::once("--help"))
        .collect::<Vec<_>>();

    let help = gpgmail.get_matches_from_safe_borrow(&args)
        .unwrap_err().to_string();

    writeln!(sink, "//! ```text")?;
    for line in help.trim_end().split('\n').skip(1) {
        if line.is_empty() {
            writeln!(sink, "//!")?;
        } else {
            writeln!(sink, "//! {}", line.trim_end())?;
        }
    }
    writeln!(sink, "//! ```")?;

    // Recurse into the subcommands listed in the help text.
    let mut found_subcommands = false;
    for subcmd in help.split('\n').filter_map(move |line| {
        if line == "SUBCOMMANDS:" {
            found_subcommands = true;
            None
        } else if found_subcommands {
            if line.chars().nth(4).map(|c| ! c.is_ascii_whitespace())
                .unwrap_or(false)
            {
                line.trim_start().split(' ').next()
            } else {
                None
            }
        } else {
            None
        }
    }).filter(|subcmd| *subcmd != "help") {
        let mut c = cmd.clone();
        c.push(subcmd.into());
        dump_help(sink, gpgmail, c, &format!("{}#", heading))?;
    }

    Ok(())
}
