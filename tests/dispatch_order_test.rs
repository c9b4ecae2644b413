// Dispatch order: inline actions, notifications, ordinals
use ledger_sim::*;
use proptest::prelude::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn payload(value: i64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// sender / receiver / notified1..3 from the classic inline example; notified4 is a plain account.
fn inline_example() -> Blockchain {
    let mut chain = Blockchain::new();
    chain.create_accounts(&["alice", "notified4"]).unwrap();

    let sender = NativeContract::new()
        .on_action(n("send1"), |ctx, host| {
            host.print(" 1 ");
            let (me, data) = (ctx.receiver, ctx.data.clone());
            ctx.send_inline(me, n("send2"), vec![PermissionLevel::active(me)], data);
            Ok(())
        })
        .on_action(n("send2"), |ctx, host| {
            host.print(" 2 ");
            let (me, data) = (ctx.receiver, ctx.data.clone());
            ctx.send_inline(n("receiver"), n("receive1"), vec![PermissionLevel::active(me)], data.clone());
            ctx.require_recipient(n("notified1"));
            ctx.require_recipient(n("notified2"));
            ctx.send_inline(n("receiver"), n("receive2"), vec![PermissionLevel::active(me)], data);
            Ok(())
        });
    chain.deploy_contract("sender", sender.factory()).unwrap();

    let notified1 = NativeContract::new()
        .on_notify("*::send2", |ctx, host| {
            host.print(" 3 ");
            let (me, data) = (ctx.receiver, ctx.data.clone());
            ctx.send_inline(n("receiver"), n("receive3"), vec![PermissionLevel::active(me)], data);
            ctx.require_recipient(n("notified3"));
            Ok(())
        })
        .unwrap();
    chain.deploy_contract("notified1", notified1.factory()).unwrap();

    let notified2 = NativeContract::new()
        .on_notify("*::send2", |ctx, host| {
            host.print(" 4 ");
            let (me, data) = (ctx.receiver, ctx.data.clone());
            ctx.send_inline(n("receiver"), n("receive4"), vec![PermissionLevel::active(me)], data);
            ctx.require_recipient(n("notified4"));
            Ok(())
        })
        .unwrap();
    chain.deploy_contract("notified2", notified2.factory()).unwrap();

    let notified3 = NativeContract::new()
        .on_notify("*::send2", |_, host| {
            host.print(" 5 ");
            Ok(())
        })
        .unwrap();
    chain.deploy_contract("notified3", notified3.factory()).unwrap();

    let mut receiver = NativeContract::new();
    for (action, output) in [("receive1", " 7 "), ("receive2", " 8 "), ("receive3", " 9 "), ("receive4", " 10 ")] {
        receiver = receiver.on_action(n(action), move |_, host| {
            host.print(output);
            Ok(())
        });
    }
    chain.deploy_contract("receiver", receiver.factory()).unwrap();
    chain
}

fn send1() -> Transaction {
    Transaction::from_action(Action::new(
        n("sender"),
        n("send1"),
        vec![PermissionLevel::active(n("alice"))],
        payload(5),
    ))
}

#[test]
fn test_inline_example_console() {
    init_logger();
    let mut chain = inline_example();
    chain.apply_transaction(send1(), None).unwrap();
    assert_eq!(chain.console(), " 1  2  3  4  5  7  8  9  10 ");
    println!("OK: inline example console matches");
}

#[test]
fn test_inline_example_trace() {
    init_logger();
    let mut chain = inline_example();
    chain.apply_transaction(send1(), None).unwrap();

    let expected = [
        ("sender", "sender", "send1", 0, false),
        ("sender", "sender", "send2", 1, false),
        ("notified1", "sender", "send2", 1, true),
        ("notified2", "sender", "send2", 1, true),
        ("notified3", "sender", "send2", 1, true),
        ("notified4", "sender", "send2", 1, true),
        ("receiver", "receiver", "receive1", 2, false),
        ("receiver", "receiver", "receive2", 3, false),
        ("receiver", "receiver", "receive3", 4, false),
        ("receiver", "receiver", "receive4", 5, false),
    ];
    let traces = chain.execution_traces();
    assert_eq!(traces.len(), expected.len());
    for (i, (trace, (receiver, first, action, ordinal, notification))) in traces.iter().zip(expected).enumerate() {
        assert_eq!(trace.execution_order as usize, i, "{}", trace.summary());
        assert_eq!(trace.receiver, n(receiver), "{}", trace.summary());
        assert_eq!(trace.first_receiver, n(first), "{}", trace.summary());
        assert_eq!(trace.action, n(action), "{}", trace.summary());
        assert_eq!(trace.action_ordinal, ordinal, "{}", trace.summary());
        assert_eq!(trace.is_notification, notification, "{}", trace.summary());
    }

    assert!(!traces[0].is_inline);
    assert!(traces[1].is_inline);
    assert_eq!(traces[1].sender, Some(n("sender")));
    assert_eq!(traces[8].sender, Some(n("notified1")));
    assert_eq!(traces[9].sender, Some(n("notified2")));
}

#[test]
fn test_decoded_data_reaches_trace() {
    let mut chain = inline_example();
    let decoded = serde_json::json!({ "owner": "alice", "value": 5 });
    chain.apply_transaction(send1(), Some(decoded.clone())).unwrap();
    let traces = chain.execution_traces();
    assert_eq!(traces[0].decoded_data, Some(decoded));
    assert_eq!(traces[0].data, hex::encode(payload(5)));
    // inline actions carry raw data only
    assert_eq!(traces[1].decoded_data, None);
}

#[test]
fn test_missing_contract_anywhere_in_transaction() {
    let mut chain = inline_example();
    let tx = Transaction::new(vec![
        send1().actions[0].clone(),
        Action::new(n("nobody"), n("send1"), vec![], Vec::<u8>::new()),
    ]);
    let err = chain.apply_transaction(tx, None).unwrap_err();
    assert!(matches!(err, SimError::MissingContract(name) if name == n("nobody")));
    // first action ran completely before the failure
    assert_eq!(chain.execution_traces().len(), 10);
}

#[test]
fn test_missing_inline_receiver() {
    let mut chain = Blockchain::new();
    let contract = NativeContract::new().on_action(n("go"), |ctx, _| {
        ctx.send_inline(n("ghost"), n("boo"), vec![], Vec::<u8>::new());
        Ok(())
    });
    chain.deploy_contract("caller", contract.factory()).unwrap();
    let tx = Transaction::from_action(Action::new(n("caller"), n("go"), vec![], Vec::<u8>::new()));
    let err = chain.apply_transaction(tx, None).unwrap_err();
    assert!(err.is_missing_contract());
    assert_eq!(err.to_string(), "Contract ghost missing for inline action");
}

#[test]
fn test_vm_error_carries_context() {
    let mut chain = Blockchain::new();
    let contract = NativeContract::new().on_action(n("go"), |_, _| Err(anyhow::anyhow!("overdrawn balance")));
    chain.deploy_contract("token", contract.factory()).unwrap();
    let tx = Transaction::from_action(Action::new(n("token"), n("go"), vec![], Vec::<u8>::new()));
    match chain.apply_transaction(tx, None).unwrap_err() {
        SimError::Vm { receiver, action, source } => {
            assert_eq!(receiver, n("token"));
            assert_eq!(action, n("go"));
            assert_eq!(source.to_string(), "overdrawn balance");
        }
        other => panic!("unexpected error {other}"),
    }
}

/// Contracts c1..c4 spawn inline actions and notifications driven by `[depth, seed]` data.
fn branching_chain() -> Blockchain {
    fn target(seed: u8) -> Name {
        n(["c1", "c2", "c3", "c4"][(seed % 4) as usize])
    }

    let mut chain = Blockchain::new();
    for account in ["c1", "c2", "c3", "c4"] {
        let contract = NativeContract::new()
            .on_action(n("run"), |ctx, _| {
                let (depth, seed) = (ctx.data[0], ctx.data[1]);
                if depth == 0 {
                    return Ok(());
                }
                for k in 0..seed % 3 {
                    let child_seed = seed.wrapping_mul(7).wrapping_add(k);
                    ctx.send_inline(target(seed.wrapping_add(k)), n("run"), vec![], vec![depth - 1, child_seed]);
                }
                if seed % 2 == 0 {
                    ctx.require_recipient(target(seed.wrapping_add(1)));
                }
                Ok(())
            })
            .on_notify("*::run", |ctx, _| {
                let (depth, seed) = (ctx.data[0], ctx.data[1]);
                if depth > 0 && seed % 5 == 0 {
                    ctx.send_inline(n("c1"), n("run"), vec![], vec![depth - 1, seed.wrapping_add(1)]);
                }
                Ok(())
            })
            .unwrap();
        chain.deploy_contract(account, contract.factory()).unwrap();
    }
    chain
}

proptest! {
    #[test]
    fn prop_ordinals_follow_queue_rules(
        roots in proptest::collection::vec((0u8..4, 0u8..4, any::<u8>()), 1..4)
    ) {
        let mut chain = branching_chain();
        let actions = roots
            .iter()
            .map(|(account, depth, seed)| {
                let account = ["c1", "c2", "c3", "c4"][*account as usize];
                Action::new(n(account), n("run"), vec![], vec![*depth, *seed])
            })
            .collect();
        chain.apply_transaction(Transaction::new(actions), None).unwrap();

        let traces = chain.execution_traces();
        prop_assert!(!traces.is_empty());
        prop_assert_eq!(traces[0].action_ordinal, 0);
        prop_assert!(!traces[0].is_notification);
        for (i, trace) in traces.iter().enumerate() {
            prop_assert_eq!(trace.execution_order as usize, i);
            if i > 0 {
                let previous = traces[i - 1].action_ordinal;
                if trace.is_notification {
                    prop_assert_eq!(trace.action_ordinal, previous);
                } else {
                    prop_assert_eq!(trace.action_ordinal, previous + 1);
                }
            }
        }
        let top_level = traces.iter().filter(|t| !t.is_inline && !t.is_notification).count();
        prop_assert_eq!(top_level, roots.len());
    }
}
