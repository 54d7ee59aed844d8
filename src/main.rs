use std::process;

use fequery::{
    app::{self, AppContext, AppError},
    config::{self, Command},
    domain::{ExampleRecord, validate_record},
    infra::telemetry,
    resource::ClientError,
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let app = AppContext::from_settings(&settings)?;
    let sweeper = app.cache().spawn_gc_sweeper();

    let result = execute(&app, cli_args.command).await;

    sweeper.abort();
    result
}

async fn execute(app: &AppContext, command: Command) -> Result<(), AppError> {
    match command {
        Command::List => print_examples(app).await,
        Command::Get(args) => {
            let record = app::resolve(&app.example_query(Some(&args.name))).await?;
            print_json(&*record)
        }
        Command::Create(args) => {
            let record = form_record(args.name, args.age)?;
            let name = record.name.clone();
            app.create_example().run(record).await?;
            info!(name = %name, "Example created");
            print_examples(app).await
        }
        Command::Replace(args) => {
            let record = form_record(args.name.clone(), args.age)?;
            app.replace_example(&args.name).run(record).await?;
            info!(name = %args.name, "Example replaced");
            print_examples(app).await
        }
        Command::Delete(args) => {
            app.delete_example().run(args.name.clone()).await?;
            info!(name = %args.name, "Example deleted");
            print_examples(app).await
        }
        Command::Info => {
            let info = app::resolve(&app.user_info_query()).await?;
            print_json(&*info)
        }
    }
}

/// Apply the edit form's rules before anything is sent.
fn form_record(name: String, age: u32) -> Result<ExampleRecord, AppError> {
    let record = ExampleRecord::new(name, age);
    validate_record(&record).map_err(ClientError::from)?;
    Ok(record)
}

async fn print_examples(app: &AppContext) -> Result<(), AppError> {
    let records = app::resolve(&app.examples_query()).await?;
    print_json(&*records)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
