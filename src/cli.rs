use anyhow::{bail, Context, Result};
use api::*;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use crate::client::Client;

mod api;
mod client;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,
}
#[derive(Subcommand)]
enum Commands {
    Health,
    Models,
    /// Score input without submitting it anywhere
    Predict {
        #[arg(short, long)]
        model: String,
        /// JSON object with the model's input fields
        #[arg(short, long, default_value = "{}")]
        input: String,
    },
    CreateContract {
        #[arg(short, long)]
        creator: String,
        #[arg(short = 't', long)]
        contract_type: String,
        #[arg(long)]
        threshold: i64,
    },
    GetContract {
        #[arg(short, long)]
        contract: ContractId,
    },
    Contracts,
    Predictions {
        #[arg(short, long)]
        contract: ContractId,
    },
    Latest {
        #[arg(short, long)]
        contract: ContractId,
    },
    /// Score input and submit the result to a contract
    Request {
        #[arg(short, long)]
        contract: ContractId,
        #[arg(short, long)]
        model: String,
        #[arg(short, long, default_value = "{}")]
        input: String,
        #[arg(short, long)]
        submitter: Option<String>,
    },
    Authorize {
        #[arg(short, long)]
        address: String,
        #[arg(long)]
        caller: String,
    },
}

fn parse_input(input: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(input).context("input is not valid JSON")?;
    if !value.is_object() {
        bail!("input must be a JSON object");
    }
    Ok(value)
}

fn print(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let client = Client::new(cli.url.trim_end_matches('/').to_string());

    match cli.command {
        Commands::Health => print(&client.health().await?)?,
        Commands::Models => print(&client.models().await?)?,
        Commands::Predict { model, input } => {
            let score = client.predict(model, parse_input(&input)?).await?;
            print(&score)?;
        }
        Commands::CreateContract {
            creator,
            contract_type,
            threshold,
        } => {
            let request = NewContractRequest {
                creator,
                contract_type,
                threshold,
            };
            print(&client.new_contract(request).await?)?;
        }
        Commands::GetContract { contract } => match client.get_contract(contract).await? {
            Some(contract) => print(&contract)?,
            None => bail!("contract {} not found", contract),
        },
        Commands::Contracts => print(&client.get_contracts().await?)?,
        Commands::Predictions { contract } => print(&client.get_predictions(contract).await?)?,
        Commands::Latest { contract } => print(&client.get_latest_prediction(contract).await?)?,
        Commands::Request {
            contract,
            model,
            input,
            submitter,
        } => {
            let request = RequestPredictionRequest {
                model_name: model,
                input: parse_input(&input)?,
                submitter,
            };
            print(&client.request_prediction(contract, request).await?)?;
        }
        Commands::Authorize { address, caller } => {
            client
                .authorize_oracle(AuthorizeOracleRequest {
                    address: address.clone(),
                    caller,
                })
                .await?;
            println!("Authorized oracle {}", address);
        }
    }
    Ok(())
}
