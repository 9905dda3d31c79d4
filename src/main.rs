use clap::Parser;
use qmdrender::renderer::quarto::build_args;
use qmdrender::{
    exit_code, logging, Cli, OutputFormatter, OutputMode, QmdRender, QmdRenderError,
    UserFriendlyError,
};
use std::process;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();
    logging::init_cli_logger(cli.verbosity_level());

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let app = match QmdRender::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return exit_code(&e);
        }
    };

    if cli.dry_run {
        return handle_dry_run(&app);
    }

    match app.render_document().await {
        Ok(report) => {
            app.output_formatter().print_render_report(&report);
            0
        }
        Err(e) => {
            app.handle_error(&e);
            exit_code(&e)
        }
    }
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "qmdrender.toml".to_string());

    match QmdRender::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  qmdrender --config {}", config_path);
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            1
        }
    }
}

fn handle_dry_run(app: &QmdRender) -> i32 {
    let formatter = app.output_formatter();

    formatter.print_header("Dry run: nothing will be rendered");

    let request = match app.build_request() {
        Ok(request) => request,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code(&e);
        }
    };

    let config = app.config();
    let folder = &config.document.folder;
    formatter.print_field("Folder", &folder.display().to_string());
    formatter.print_field("Document", &request.input);
    formatter.print_field("Format", &request.output_format);

    if !folder.is_dir() {
        formatter.warning(&format!("Folder does not exist: {}", folder.display()));
    } else if !folder.join(&request.input).exists() {
        formatter.warning(&format!(
            "Document not found in folder: {}",
            request.input
        ));
    }

    let renderer = app.build_renderer();
    let program = match renderer.locate() {
        Ok(program) => program,
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code(&e);
        }
    };
    formatter.print_field("Quarto", &program.display().to_string());

    match renderer.version() {
        Ok(version) => formatter.print_field("Quarto version", &version),
        Err(e) => formatter.warning(&format!("Could not read quarto version: {}", e)),
    }

    let args: Vec<String> = build_args(&request, None)
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    formatter.print_field("Command", &format!("{} {}", program.display(), args.join(" ")));
    if !request.options.execute_params.is_empty() {
        formatter.print_field(
            "Execute params",
            &serde_json::to_string(&request.options.execute_params).unwrap_or_default(),
        );
    }

    formatter.print_separator();
    formatter.success("Dry run completed successfully");
    0
}

fn print_startup_error(error: &QmdRenderError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
