use clap::builder::styling::{AnsiColor, Color};
use clap::builder::styling::{Style, Styles};
use clap::{ColorChoice, Parser, Subcommand};

pub const BANNER: &str = "\x1b[0;91m███    ███ ███████ ████████  █████   ██████  ██    ██  █████  ███    ██ ████████\x1b[0m\n\
                      \x1b[0;93m████  ████ ██         ██    ██   ██ ██    ██ ██    ██ ██   ██ ████   ██    ██\x1b[0m\n\
                      \x1b[0;92m██ ████ ██ █████      ██    ███████ ██    ██ ██    ██ ███████ ██ ██  ██    ██\x1b[0m\n\
                      \x1b[0;96m██  ██  ██ ██         ██    ██   ██ ██ ▄▄ ██ ██    ██ ██   ██ ██  ██ ██    ██\x1b[0m\n\
                      \x1b[0;95m██      ██ ███████    ██    ██   ██  ██████   ██████  ██   ██ ██   ████    ██\x1b[0m\n";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "metaquant",
    version = env!("CARGO_PKG_VERSION"),
    about = BANNER,
    color = ColorChoice::Always,
    styles = get_styles(),
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the quantification pipeline on alignment hits
    #[command(alias = "r")]
    Run {
        /// Alignment file (tab-delimited, .gz accepted)
        #[arg(short, long)]
        input: String,

        /// param file path
        #[arg(short, long)]
        param: String,

        /// output directory
        #[arg(short, long, default_value_t = String::from("."))]
        output: String,

        /// treat the input as a pre-computed gene table instead of
        /// alignment hits
        #[arg(long, default_value_t = false)]
        gene_table: bool,
    },

    /// Generate a param file through CLI
    #[command(alias = "g")]
    Generate {},
}

pub fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
        )
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .invalid(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
        .valid(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::White))))
}
