use assert_cmd::Command;
use predicates::prelude::*;

const ID: &str = "507f1f77bcf86cd799439011";

fn trainer() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("model-trainer").unwrap();
    // argument errors must be reported before any connection is attempted
    cmd.env("MONGO_URI", "mongodb://127.0.0.1:1/");
    cmd
}

#[test]
fn missing_arguments_print_error_line() {
    trainer()
        .assert()
        .success()
        .stdout("{\"status\":\"error\",\"message\":\"Missing modelId or configuration.\"}\n");
}

#[test]
fn missing_config_is_treated_like_missing_arguments() {
    trainer()
        .arg(ID)
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing modelId or configuration."));
}

#[test]
fn config_without_file_path_is_rejected() {
    trainer()
        .args([ID, "{}"])
        .assert()
        .success()
        .stdout("{\"status\":\"error\",\"message\":\"filePath is required.\"}\n");
}

#[test]
fn malformed_json_config_is_rejected() {
    trainer()
        .args([ID, "{not json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{\"status\":\"error\",\"message\":\"Invalid configuration"));
}

#[test]
fn invalid_model_id_is_rejected() {
    trainer()
        .args(["not-an-object-id", r#"{"filePath":"data.csv"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\":\"error\"").and(predicate::str::contains("not-an-object-id")));
}

#[test]
fn logs_stay_off_stdout() {
    trainer()
        .env("RUST_LOG", "debug")
        .args([ID, "{}"])
        .assert()
        .success()
        .stdout(predicate::str::is_match("^\\{[^\\n]*\\}\\n$").unwrap());
}
