pub mod logging;
pub mod otp;
pub mod token;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("otp-auth")
        .about("Phone number authentication with one-time passcodes")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("8080")
                .env("OTP_AUTH_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("dsn")
                .short('d')
                .long("dsn")
                .help("PostgreSQL connection string for the user store")
                .long_help(
                    "PostgreSQL connection string for the user store. Without it users are kept in memory and lost on restart.",
                )
                .env("OTP_AUTH_DSN"),
        )
        .arg(
            Arg::new("redis-url")
                .short('r')
                .long("redis-url")
                .help("Redis URL for passcodes and rate limits, e.g. redis://localhost:6379/0")
                .long_help(
                    "Redis URL for passcodes and rate limits, e.g. redis://localhost:6379/0. \
                     Required when running more than one instance. Without it this state is \
                     kept in process memory.",
                )
                .env("OTP_AUTH_REDIS_URL"),
        );

    let command = otp::with_args(command);
    let command = token::with_args(command);
    logging::with_args(command)
}
