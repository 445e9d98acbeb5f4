// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("pakt")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pakt Contributors")
        .about("Cross-platform package manager for user-owned installation prefixes")
        .arg(
            Arg::new("prefix")
                .short('p')
                .long("prefix")
                .value_name("PATH")
                .global(true)
                .help("Use PATH as the installation prefix"),
        )
        .subcommand(
            Command::new("mkprefix")
                .about("Create a new installation prefix")
                .arg(Arg::new("path").required(true).help("Directory to create the prefix in"))
                .arg(
                    Arg::new("url")
                        .long("url")
                        .help("Also configure a repository with this URL"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .default_value("main")
                        .help("Name for the configured repository"),
                ),
        )
        .subcommand(
            Command::new("update").about("Fetch the package lists of all enabled repositories"),
        )
        .subcommand(
            Command::new("install")
                .about("Install packages (NAME or NAME=VERSION)")
                .arg(Arg::new("packages").required(true).num_args(1..))
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print the action plan without applying it"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages")
                .arg(Arg::new("packages").required(true).num_args(1..))
                .arg(
                    Arg::new("cascade")
                        .long("cascade")
                        .action(ArgAction::SetTrue)
                        .help("Also remove installed packages that depend on the target"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade every installed package to the newest available version")
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("search")
                .about("Search available packages by name or description")
                .arg(Arg::new("term").required(true).help("Search term")),
        )
        .subcommand(
            Command::new("rdepends")
                .about("Show the reverse dependencies of a package")
                .arg(Arg::new("target").required(true).help("Package to inspect"))
                .arg(
                    Arg::new("recursive")
                        .short('r')
                        .long("recursive")
                        .action(ArgAction::SetTrue)
                        .help("Print the reverse dependencies recursively"),
                )
                .arg(
                    Arg::new("repo")
                        .long("repo")
                        .value_name("REPO")
                        .help("Only consider packages provided by this repository"),
                )
                .arg(
                    Arg::new("sumsha")
                        .long("sumsha")
                        .action(ArgAction::SetTrue)
                        .help("Look the package up by its sumsha instead of its name"),
                ),
        )
        .subcommand(
            Command::new("runprefix")
                .about("Run a command with the prefix environment injected")
                .arg(Arg::new("command").required(true).num_args(1..)),
        )
        .subcommand(
            Command::new("repo")
                .about("Manage the repositories of a prefix")
                .subcommand(
                    Command::new("add")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("url").required(true))
                        .arg(Arg::new("priority").long("priority").default_value("0"))
                        .arg(
                            Arg::new("disabled")
                                .long("disabled")
                                .action(ArgAction::SetTrue),
                        ),
                )
                .subcommand(Command::new("remove").arg(Arg::new("name").required(true)))
                .subcommand(Command::new("list"))
                .subcommand(Command::new("enable").arg(Arg::new("name").required(true)))
                .subcommand(Command::new("disable").arg(Arg::new("name").required(true))),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pakt.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
