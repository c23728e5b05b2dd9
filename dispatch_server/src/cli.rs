use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 22] = [
        "RUST_LOG",
        "DSP_HOST",
        "DSP_PORT",
        "DSP_DATABASE_URL",
        "DSP_PAYSTACK_BASE_URL",
        "DSP_PAYSTACK_EMAIL_DOMAIN",
        "DSP_PAYSTACK_IP_WHITELIST",
        "DSP_USE_X_FORWARDED_FOR",
        "DSP_USE_FORWARDED",
        "DSP_WHATSAPP_API_URL",
        "DSP_WHATSAPP_PHONE_NUMBER_ID",
        "DSP_INVOICE_RENDERER_URL",
        "DSP_ADMIN_ALERT_RECIPIENTS",
        "DSP_ALERT_BATCH_SECS",
        "DSP_PAYMENT_WINDOW_MINS",
        "DSP_AUTO_RELEASE_HOURS",
        "DSP_STUCK_ASSIGNMENT_MINS",
        "DSP_RIDER_FEE_PERCENT",
        "DSP_BROADCAST_DELAY_MS",
        "DSP_SWEEPS_ENABLED",
        "DSP_IDEMPOTENCY_BACKEND",
        "DSP_INSTANCE_ID",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
