mod support;

use redpool_client::{Command, GatewayError, Reply, RedisClient};

#[test]
fn replies_come_back_in_stage_order() {
    let server = support::store_server();
    let client = support::connect(&server.addr);

    let replies = client
        .pipelined(|pipe| {
            pipe.set(b"a", b"1")
                .incr(b"hits")
                .incr(b"hits")
                .get(b"a")
                .get(b"missing");
            Ok(())
        })
        .expect("pipeline");

    assert_eq!(
        replies,
        vec![
            Reply::Simple(b"OK".to_vec()),
            Reply::Integer(1),
            Reply::Integer(2),
            Reply::Bulk(b"1".to_vec()),
            Reply::Nil,
        ]
    );
    client.shutdown();
}

#[test]
fn arbitrary_batch_sizes_keep_positional_correspondence() {
    let server = support::store_server();
    let client = support::connect(&server.addr);

    for batch in [1usize, 2, 7, 40] {
        let replies = client
            .pipelined(|pipe| {
                for idx in 0..batch {
                    pipe.set(format!("k{idx}").as_bytes(), format!("v{idx}").as_bytes());
                }
                for idx in 0..batch {
                    pipe.get(format!("k{idx}").as_bytes());
                }
                Ok(())
            })
            .expect("pipeline");

        assert_eq!(replies.len(), batch * 2);
        for idx in 0..batch {
            assert_eq!(replies[idx], Reply::Simple(b"OK".to_vec()));
            assert_eq!(
                replies[batch + idx],
                Reply::Bulk(format!("v{idx}").into_bytes())
            );
        }
    }
    client.shutdown();
}

#[test]
fn staging_failure_still_releases_the_connection() {
    let server = support::store_server();
    let mut config = support::base_config(&server.addr);
    config.max_total = 1;
    config.max_idle = 1;
    let client = RedisClient::with_config(config).expect("client");

    let err = client
        .pipelined(|pipe| {
            pipe.set(b"a", b"1").set(b"b", b"2");
            Err(GatewayError::InvalidArgument("staging aborted"))
        })
        .expect_err("staging error must propagate");
    assert!(matches!(err, GatewayError::InvalidArgument(_)));
    assert_eq!(client.pool_stats().in_use(), 0);

    // The only slot is free again; staged-but-unflushed commands never ran.
    assert_eq!(client.get(b"a").expect("get"), None);
    client.shutdown();
}

#[test]
fn per_command_server_errors_stay_in_position() {
    let server = support::spawn_server(|args, wire| match args[0].as_slice() {
        b"SET" => wire.simple("OK"),
        b"INCR" => wire.error("WRONGTYPE not an integer"),
        _ => wire.nil(),
    });
    let client = support::connect(&server.addr);

    let replies = client
        .pipelined(|pipe| {
            pipe.set(b"k", b"text").incr(b"k").get(b"other");
            Ok(())
        })
        .expect("pipeline");

    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], Reply::Simple(b"OK".to_vec()));
    assert!(matches!(replies[1], Reply::Error(_)));
    assert_eq!(replies[2], Reply::Nil);
    client.shutdown();
}

#[test]
fn empty_staging_returns_no_replies() {
    let server = support::store_server();
    let client = support::connect(&server.addr);

    let replies = client.pipelined(|_pipe| Ok(())).expect("pipeline");
    assert!(replies.is_empty());
    assert_eq!(client.pool_stats().in_use(), 0);
    client.shutdown();
}

#[test]
fn generic_commands_can_be_staged() {
    let server = support::spawn_server(|args, wire| {
        assert_eq!(args[0], b"ECHO");
        wire.bulk(&args[1]);
    });
    let client = support::connect(&server.addr);

    let replies = client
        .pipelined(|pipe| {
            pipe.cmd(Command::new("ECHO").arg(b"one"))
                .cmd(Command::new("ECHO").arg(b"two"));
            Ok(())
        })
        .expect("pipeline");
    assert_eq!(
        replies,
        vec![Reply::Bulk(b"one".to_vec()), Reply::Bulk(b"two".to_vec())]
    );
    client.shutdown();
}
