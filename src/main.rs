use std::process::ExitCode;

use imap_fetch::authfile;
use imap_fetch::config::Config;
use imap_fetch::store::LocalStore;
use imap_fetch::transport::Transport;
use imap_fetch::{Error, Session};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok((summary, mailbox)) => {
            println!("{}", summary.describe(&mailbox));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<(imap_fetch::RunSummary, String), Error> {
    let config = Config::parse_from(std::env::args())?;
    let credentials = authfile::read(&config.auth_file)?;

    let transport = Transport::connect(&config)?;
    let store = LocalStore::new(&config.output_dir);

    let session = Session::new(transport);
    let summary = session.run(&config, &credentials, &store)?;
    Ok((summary, config.mailbox))
}
