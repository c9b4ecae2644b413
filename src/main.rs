use clap::{Parser, Subcommand};
use ledger_sim::*;
use serde_json::json;
use std::process;

#[derive(Parser)]
#[command(name = "ledger-sim")]
#[command(about = "Ledger Sim CLI - contract execution simulator utilities")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode an account/action name into its 64-bit value
    NameEncode {
        /// Name such as `eosio.token`
        name: String,
    },

    /// Decode a 64-bit value back into a name
    NameDecode {
        value: u64,
    },

    /// Print the code hash record of a contract file
    CodeHash {
        /// Path or URL of the contract code
        file: String,
    },

    /// Run the inline action / notification demo and print trace, console and deltas
    Demo {
        /// Value carried by the demo actions
        #[arg(short, long, default_value = "5")]
        value: i64,

        /// Rebuild VMs one account at a time
        #[arg(long)]
        sequential: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::NameEncode { name } => handle_name_encode(name),
        Commands::NameDecode { value } => handle_name_decode(value),
        Commands::CodeHash { file } => handle_code_hash(file),
        Commands::Demo { value, sequential } => handle_demo(value, sequential),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn handle_name_encode(name: String) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let parsed = Name::parse(&name)?;
    println!("Name: {}", parsed);
    println!("Value: {}", parsed.raw());
    Ok(())
}

fn handle_name_decode(value: u64) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let name = Name::from_raw(value);
    println!("Value: {}", value);
    println!("Name: {}", name);
    Ok(())
}

fn handle_code_hash(file: String) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let code = loader::load(&file)?;
    let account = Account::new(Name::EMPTY).with_code(code);
    println!("{}", serde_json::to_string_pretty(&account.code_hash())?);
    Ok(())
}

fn handle_demo(value: i64, sequential: bool) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let mut chain = Blockchain::with_config(BlockchainConfig {
        storage_deltas: true,
        parallel_vm_reset: !sequential,
        ..BlockchainConfig::default()
    });
    install_demo_contracts(&mut chain)?;

    let owner = n("alice");
    let action = Action::new(
        n("sender"),
        n("send1"),
        vec![PermissionLevel::active(owner)],
        demo_payload(owner, value),
    );
    let decoded = json!({ "owner": owner, "value": value });
    chain.apply_transaction(Transaction::from_action(action), Some(decoded))?;

    let report = json!({
        "console": chain.console(),
        "traces": chain.execution_traces(),
        "summary": chain.execution_traces().iter().map(|t| t.summary()).collect::<Vec<_>>(),
        "storageDeltas": chain.storage_deltas()?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn demo_payload(owner: Name, value: i64) -> Vec<u8> {
    let mut data = owner.raw().to_le_bytes().to_vec();
    data.extend_from_slice(&value.to_le_bytes());
    data
}

fn payload_value(data: &[u8]) -> i64 {
    data.get(data.len().saturating_sub(8)..)
        .and_then(|tail| <[u8; 8]>::try_from(tail).ok())
        .map(i64::from_le_bytes)
        .unwrap_or_default()
}

/// sender::send1 → sender::send2 → receiver::receive1..4, with send2 fanned out to
/// notified1..3 and the plain account notified4.
fn install_demo_contracts(chain: &mut Blockchain) -> Result<()> {
    chain.create_accounts(&["alice", "notified4"])?;

    let sender = NativeContract::new()
        .on_action(n("send1"), |ctx, host| {
            host.print(" 1 ");
            let (me, data) = (ctx.receiver, ctx.data.clone());
            ctx.send_inline(me, n("send2"), vec![PermissionLevel::active(me)], data);
            Ok(())
        })
        .on_action(n("send2"), |ctx, host| {
            host.print(" 2 ");
            let value = payload_value(&ctx.data).to_le_bytes().to_vec();
            let self_auth = vec![PermissionLevel::active(ctx.receiver)];
            ctx.send_inline(n("receiver"), n("receive1"), self_auth.clone(), value.clone());
            ctx.require_recipient(n("notified1"));
            ctx.require_recipient(n("notified2"));
            ctx.send_inline(n("receiver"), n("receive2"), self_auth, value);
            Ok(())
        });
    chain.deploy_contract("sender", sender.factory())?;

    let forwarders = [
        ("notified1", " 3 ", Some(("receive3", "notified3"))),
        ("notified2", " 4 ", Some(("receive4", "notified4"))),
        ("notified3", " 5 ", None),
    ];
    for (account, output, forward) in forwarders {
        let contract = NativeContract::new()
            .on_action(n("empty"), |_, _| Ok(()))
            .on_notify("*::send2", move |ctx, host| {
                host.print(output);
                if let Some((action, next)) = forward {
                    let value = payload_value(&ctx.data).to_le_bytes().to_vec();
                    let auth = vec![PermissionLevel::active(ctx.receiver)];
                    ctx.send_inline(n("receiver"), n(action), auth, value);
                    ctx.require_recipient(n(next));
                }
                Ok(())
            })?;
        chain.deploy_contract(account, contract.factory())?;
    }

    let mut receiver = NativeContract::new();
    for (action, output) in [("receive1", " 7 "), ("receive2", " 8 "), ("receive3", " 9 "), ("receive4", " 10 ")] {
        receiver = receiver.on_action(n(action), move |ctx, host| {
            host.print(output);
            let (code, table) = (ctx.receiver, n("received"));
            let next_key = host
                .store()
                .find_table(code, code, table)
                .and_then(|t| t.highest_key())
                .map_or(0, |k| k + 1);
            host.store_mut().store(code, code, table, code, next_key, ctx.data.clone())?;
            Ok(())
        });
    }
    let decoder: std::sync::Arc<dyn RowDecoder> =
        std::sync::Arc::new(|_table: Name, raw: &[u8]| -> anyhow::Result<serde_json::Value> {
            Ok(json!({ "value": payload_value(raw) }))
        });
    chain
        .deploy_contract("receiver", receiver.factory())?
        .set_row_decoder(decoder);
    Ok(())
}
