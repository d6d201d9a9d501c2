mod common;

use chainhawk_core::address::{is_valid_address, same_address};
use chainhawk_core::chain::ChainHandle;
use chainhawk_core::config::DeployConfig;
use chainhawk_core::deploy::{AddressSource, ContractDeployer, PredictionConfidence};
use chainhawk_core::process::CommandOutput;
use chainhawk_core::project::DeploymentRequest;
use common::{foundry_project, ScriptedRpc, ScriptedRunner, ANVIL_DEPLOYER, VAULT_SOL};
use serde_json::json;

const RECEIPT_ADDRESS: &str = "0x2222222222222222222222222222222222222222";
const NONCE_0: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const NONCE_1: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

fn chain() -> ChainHandle {
    ChainHandle {
        container_name: "chainhawk-anvil".into(),
        rpc_url: "http://localhost:8545".into(),
        chain_id: 31337,
    }
}

fn config() -> DeployConfig {
    DeployConfig {
        receipt_delay_ms: 0,
        ..DeployConfig::default()
    }
}

fn runner_with_create(stdout: &str) -> ScriptedRunner {
    ScriptedRunner::new()
        .on("forge", &["build"], CommandOutput::success("Compiler run successful!"))
        .on("forge", &["create"], CommandOutput::success(stdout))
}

#[tokio::test]
async fn test_receipt_address_wins_when_deploy_output_has_only_tx_hash() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create(r#"{"deployedTo": null, "transactionHash": "0xabc"}"#);
    let rpc = ScriptedRpc::new()
        .ok("eth_getTransactionCount", json!("0x0"))
        .ok(
            "eth_getTransactionReceipt",
            json!({"contractAddress": RECEIPT_ADDRESS, "status": "0x1"}),
        );
    let config = config();
    let deployer = ContractDeployer::new(&runner, &rpc, &config);

    let result = deployer
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    assert_eq!(result.contract_address, RECEIPT_ADDRESS);
    assert_eq!(result.address_source, AddressSource::Receipt);
    assert_eq!(result.contract_name, "Vault");
    assert!(same_address(&result.predicted_address, NONCE_0));
    assert_eq!(result.prediction_confidence, PredictionConfidence::High);

    let receipts: Vec<_> = rpc
        .calls()
        .into_iter()
        .filter(|(m, _)| m == "eth_getTransactionReceipt")
        .collect();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].1, json!(["0xabc"]));

    let nonce_params = &rpc.calls()[0].1;
    assert_eq!(nonce_params, &json!([ANVIL_DEPLOYER, "latest"]));
}

#[tokio::test]
async fn test_forge_create_invocation() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create(r#"{"deployedTo":"0x5FbDB2315678afecb367f032d93F642f64180aa3"}"#);
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    let build = runner.calls_matching("forge", &["build"]);
    assert_eq!(build.len(), 1);
    assert_eq!(build[0].cwd.as_deref(), Some(project.path()));

    let create = runner.calls_matching("forge", &["create"]);
    assert_eq!(create.len(), 1);
    assert_eq!(
        create[0].args,
        vec![
            "create",
            "src/Vault.sol:Vault",
            "--rpc-url",
            "http://localhost:8545",
            "--private-key",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
            "--broadcast",
            "--json",
        ]
    );
    assert_eq!(create[0].cwd.as_deref(), Some(project.path()));
}

#[tokio::test]
async fn test_address_embedded_in_log_text() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create(
        "Compiling...\n{\"deployedTo\":\"0x1111111111111111111111111111111111111111\"}\nDone",
    );
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    let result = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    assert_eq!(result.contract_address, "0x1111111111111111111111111111111111111111");
    assert_eq!(result.address_source, AddressSource::ToolOutput);
    assert_eq!(rpc.count("eth_getTransactionReceipt"), 0);
}

#[tokio::test]
async fn test_prediction_used_when_tool_reports_nothing() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create("Deployer: 0xf39F...\nTransaction sent");
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x1"));
    let config = config();

    let result = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    assert_eq!(result.address_source, AddressSource::Predicted);
    assert!(same_address(&result.contract_address, NONCE_1));
    assert!(is_valid_address(&result.contract_address));
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_nonce_failure_gives_low_confidence_prediction() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create("no json here");
    let rpc = ScriptedRpc::new().err("eth_getTransactionCount", "header not found");
    let config = config();

    let result = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    assert_eq!(result.prediction_confidence, PredictionConfidence::Low);
    assert_eq!(result.address_source, AddressSource::Predicted);
    assert!(same_address(&result.contract_address, NONCE_0));
    assert_eq!(result.warnings.len(), 2);
    assert!(result.warnings[0].contains("nonce query failed"));
    assert!(result.warnings[1].contains("low-confidence"));
}

#[tokio::test]
async fn test_receipt_failure_falls_back_to_prediction() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create(r#"{"transactionHash": "0xdead"}"#);
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    let result = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap();

    assert_eq!(rpc.count("eth_getTransactionReceipt"), 1);
    assert_eq!(result.address_source, AddressSource::Predicted);
    assert!(same_address(&result.contract_address, NONCE_0));
}

#[tokio::test]
async fn test_malformed_reported_address_is_fatal() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = runner_with_create(r#"{"deployedTo": "0x1234"}"#);
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    let err = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("malformed address"));
}

#[tokio::test]
async fn test_compile_failure_stops_before_deploy() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = ScriptedRunner::new().on(
        "forge",
        &["build"],
        CommandOutput::failure(1, "Error: Compiler run failed:\nParserError: Expected ';'"),
    );
    let rpc = ScriptedRpc::new();
    let config = config();

    let err = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Compilation failed"));
    assert!(err.to_string().contains("ParserError"));
    assert_eq!(runner.count("forge", &["create"]), 0);
    assert!(rpc.calls().is_empty());
}

#[tokio::test]
async fn test_deploy_failure_is_fatal() {
    let project = foundry_project(&[("Vault.sol", VAULT_SOL)]);
    let runner = ScriptedRunner::new()
        .on("forge", &["build"], CommandOutput::success(""))
        .on("forge", &["create"], CommandOutput::failure(1, "Error: insufficient funds"));
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    let err = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("insufficient funds"));
}

#[tokio::test]
async fn test_invalid_project_runs_no_tools() {
    let dir = tempfile::tempdir().unwrap();
    let runner = ScriptedRunner::new();
    let rpc = ScriptedRpc::new();
    let config = config();

    let err = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(dir.path(), None), &chain())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("foundry.toml"));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_explicit_contract_name_selects_among_many() {
    let project = foundry_project(&[
        ("Vault.sol", VAULT_SOL),
        ("Token.sol", "contract Token {}\ncontract TokenHelper {}\n"),
    ]);
    let runner = runner_with_create(r#"{"deployedTo":"0x1111111111111111111111111111111111111111"}"#);
    let rpc = ScriptedRpc::new().ok("eth_getTransactionCount", json!("0x0"));
    let config = config();

    let result = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(
            &DeploymentRequest::new(project.path(), Some("TokenHelper".into())),
            &chain(),
        )
        .await
        .unwrap();
    assert_eq!(result.contract_name, "TokenHelper");
    let create = runner.calls_matching("forge", &["create"]);
    assert_eq!(create[0].args[1], "src/Token.sol:TokenHelper");
}

#[tokio::test]
async fn test_ambiguous_contracts_require_explicit_name() {
    let project = foundry_project(&[("A.sol", "contract One {}\n"), ("B.sol", "contract Two {}\n")]);
    let runner = ScriptedRunner::new();
    let rpc = ScriptedRpc::new();
    let config = config();

    let err = ContractDeployer::new(&runner, &rpc, &config)
        .deploy(&DeploymentRequest::new(project.path(), None), &chain())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("--contract"));
    assert!(runner.calls().is_empty());
}
