//! Interactive first-run setup — writes a starter `config.toml` and `.env`.

use std::path::Path;

struct ProviderPreset {
    id: &'static str,
    base_url: &'static str,
    env_var: &'static str,
}

const OPENAI: ProviderPreset = ProviderPreset {
    id: "openai",
    base_url: "https://api.openai.com/v1",
    env_var: "OPENAI_API_KEY",
};

const ANTHROPIC: ProviderPreset = ProviderPreset {
    id: "anthropic",
    base_url: "https://api.anthropic.com/v1",
    env_var: "ANTHROPIC_API_KEY",
};

/// Scaffold a new gateway project in the current directory.
pub async fn run() -> anyhow::Result<()> {
    setup_in(Path::new("."))
}

fn setup_in(base: &Path) -> anyhow::Result<()> {
    let config_path = base.join("config.toml");

    if config_path.exists() {
        anyhow::bail!("config.toml already exists. Remove it first or run in a different directory.");
    }

    let (provider_id, base_url, env_var) = prompt_provider();

    let config_content = render_config(&provider_id, &base_url, &env_var);
    let env_content = render_dotenv(&env_var);

    std::fs::write(&config_path, config_content)?;
    std::fs::write(base.join(".env"), env_content)?;

    std::fs::create_dir_all(base.join("workspace"))?;
    std::fs::create_dir_all(base.join("data/state"))?;

    eprintln!();
    eprintln!("  Personal Agent Gateway initialized!");
    eprintln!();
    eprintln!("  Created:");
    eprintln!("    config.toml   - gateway configuration");
    eprintln!("    .env          - environment variables (add your API key)");
    eprintln!("    workspace/    - agent workspace directory");
    eprintln!("    data/state/   - persistent state storage");
    eprintln!();
    eprintln!("  Next steps:");
    eprintln!("    1. Add your API key to .env");
    eprintln!("    2. Run `gateway doctor` to verify the setup");
    eprintln!("    3. Run `gateway` to start the server");
    eprintln!();

    Ok(())
}

fn prompt_provider() -> (String, String, String) {
    eprintln!();
    eprintln!("  Welcome to the Personal Agent Gateway!");
    eprintln!("  Let's set up your project.\n");

    let choice = prompt("  Which LLM provider?\n  [1] OpenAI  [2] Anthropic  [3] Other\n  >");

    match choice.as_str() {
        "2" => (
            ANTHROPIC.id.to_owned(),
            ANTHROPIC.base_url.to_owned(),
            ANTHROPIC.env_var.to_owned(),
        ),
        "3" => prompt_custom_provider(),
        _ => (
            OPENAI.id.to_owned(),
            OPENAI.base_url.to_owned(),
            OPENAI.env_var.to_owned(),
        ),
    }
}

fn prompt_custom_provider() -> (String, String, String) {
    let provider_id = prompt("  Provider ID (e.g. \"my-llm\"):");
    let base_url = prompt("  Base URL (e.g. \"https://api.example.com/v1\"):");
    let env_var = prompt("  Environment variable for the API key:");

    if provider_id.is_empty() || base_url.is_empty() || env_var.is_empty() {
        eprintln!("  Missing fields, defaulting to OpenAI.");
        return (
            OPENAI.id.to_owned(),
            OPENAI.base_url.to_owned(),
            OPENAI.env_var.to_owned(),
        );
    }

    (provider_id, base_url, env_var)
}

fn prompt(question: &str) -> String {
    eprint!("{question} ");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input).unwrap_or_default();
    input.trim().to_string()
}

fn render_config(provider_id: &str, base_url: &str, env_var: &str) -> String {
    format!(
        r#"# Personal Agent Gateway configuration

[server]
port = 3210
host = "127.0.0.1"

[llm]
default_model = "{provider_id}/default"

[[llm.providers]]
id = "{provider_id}"
base_url = "{base_url}"

[llm.providers.auth]
mode = "env"
env_var = "{env_var}"

[workspace]
# path = "./workspace"

[sessions]
agent_id = "default"
"#
    )
}

fn render_dotenv(env_var: &str) -> String {
    format!("# Personal Agent Gateway environment variables\n{env_var}=your-api-key-here\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_config_contains_provider_fields() {
        let output = render_config("openai", "https://api.openai.com/v1", "OPENAI_API_KEY");
        assert!(output.contains("id = \"openai\""));
        assert!(output.contains("base_url = \"https://api.openai.com/v1\""));
        assert!(output.contains("default_model = \"openai/default\""));
    }

    #[test]
    fn render_dotenv_contains_env_var() {
        let output = render_dotenv("OPENAI_API_KEY");
        assert!(output.contains("OPENAI_API_KEY=your-api-key-here"));
    }

    #[test]
    fn setup_fails_when_config_exists() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "existing").unwrap();

        let result = setup_in(dir.path());
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("config.toml already exists"));
    }
}
