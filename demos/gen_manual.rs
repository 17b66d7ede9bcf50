use clap::CommandFactory;
use clap_complete::{generate_to, Shell};
use clap_mangen::Man;
use std::fs;
use std::path::{Path, PathBuf};
use vcloud_mcp_rs::cli::Args;

const BIN: &str = "vcloud-mcp-rs";

fn render(cmd: clap::Command, title: String, path: &Path) -> std::io::Result<()> {
    let mut buffer: Vec<u8> = Vec::new();
    Man::new(cmd).title(title).render(&mut buffer)?;
    fs::write(path, buffer)
}

// Usage: cargo run --example gen_manual [OUT_DIR]
fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "assets".to_string()));
    let man_dir = out_dir.join("man");
    let comp_dir = out_dir.join("completions");

    fs::create_dir_all(&man_dir)?;
    fs::create_dir_all(&comp_dir)?;

    let mut cmd = Args::command();
    cmd.build();

    render(cmd.clone(), BIN.to_uppercase(), &man_dir.join(format!("{}.1", BIN)))?;
    // one page per subcommand, e.g. vcloud-mcp-rs-query.1
    for sub in cmd.get_subcommands() {
        let name = format!("{}-{}", BIN, sub.get_name());
        render(sub.clone(), name.to_uppercase(), &man_dir.join(format!("{}.1", name)))?;
    }
    println!("Man pages generated in {}", man_dir.display());

    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        generate_to(shell, &mut cmd, BIN, &comp_dir)?;
    }
    println!("Completions generated in {}", comp_dir.display());

    Ok(())
}
