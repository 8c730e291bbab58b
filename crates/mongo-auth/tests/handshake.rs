//! End-to-end handshakes against scripted connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bson::{Document, doc, oid::ObjectId};
use mongo_auth::{
    AuthMechanism, AuthenticatorFactory, ConnectionInitializer, Credential, FixedRandom,
    HandshakeError,
};
use mongo_protocol::{CancellationToken, Connection, reply as reply_fields};
use mongo_testing::{MockConnection, reply};
use tokio_test::assert_ok;

const SHA256_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
const SHA256_SERVER_FIRST: &[u8] =
    b"r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096";
const SHA256_CLIENT_FINAL: &[u8] = b"c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";
const SHA256_SERVER_FINAL: &[u8] = b"v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=";

const SHA1_NONCE: &str = "fyko+d2lbbFgONRv9qkxdawL";
const SHA1_SERVER_FIRST: &[u8] =
    b"r=fyko+d2lbbFgONRv9qkxdawLHo+Vgk7qvUOKUwuWLIWg4l/9SraGMHEE,s=rQ9ZY3MntBeuP3E1TDVC4w==,i=10000";
const SHA1_SERVER_FINAL: &[u8] = b"v=UMWeI25JD1yNYZRMpZ4VHvhZ9e0=";

fn initializer(credential: Credential, nonce: &str) -> ConnectionInitializer {
    let factory = AuthenticatorFactory::new(credential)
        .unwrap()
        .with_random_source(Arc::new(FixedRandom::scram(nonce)));
    ConnectionInitializer::new().with_authenticator_factory(factory)
}

fn payload(command: &Document) -> Vec<u8> {
    reply_fields::get_binary(command, "payload").unwrap().to_vec()
}

#[tokio::test]
async fn test_scram_sha256_two_round_trips() {
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(5))
        .with_reply(reply::sasl(1, SHA256_SERVER_FIRST, false))
        .with_reply(reply::sasl(1, SHA256_SERVER_FINAL, true));
    let probe = connection.probe();
    let initializer = initializer(
        Credential::scram(AuthMechanism::ScramSha256, "user", "pencil"),
        SHA256_NONCE,
    );

    let description = assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );
    assert_eq!(description.connection_id().server_value(), Some(5));
    assert_eq!(connection.id().server_value(), Some(5));

    let commands = probe.commands();
    assert_eq!(probe.command_names(), ["hello", "saslStart", "saslContinue"]);
    assert_eq!(commands[1].database, "admin");
    assert_eq!(payload(&commands[1].command), b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");
    assert_eq!(payload(&commands[2].command), SHA256_CLIENT_FINAL);
    assert!(
        commands[1]
            .command
            .get_document("options")
            .unwrap()
            .get_bool("skipEmptyExchange")
            .unwrap()
    );
}

#[tokio::test]
async fn test_speculative_scram_skips_sasl_start() {
    let mut hello = reply::hello(5);
    hello.insert(
        "speculativeAuthenticate",
        doc! {
            "conversationId": 1,
            "done": false,
            "payload": reply::binary(SHA256_SERVER_FIRST),
        },
    );
    let mut connection = MockConnection::new(1)
        .with_reply(hello)
        .with_reply(reply::sasl(1, SHA256_SERVER_FINAL, true));
    let probe = connection.probe();
    let initializer = initializer(
        Credential::scram(AuthMechanism::ScramSha256, "user", "pencil"),
        SHA256_NONCE,
    );

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );

    assert_eq!(probe.command_names(), ["hello", "saslContinue"]);
    let commands = probe.commands();
    let speculative = commands[0]
        .command
        .get_document("speculativeAuthenticate")
        .unwrap();
    assert_eq!(speculative.get_str("db").unwrap(), "admin");
    assert_eq!(payload(speculative), b"n,,n=user,r=rOprNGfwEbeRWgbNEkqO");
    assert_eq!(payload(&commands[1].command), SHA256_CLIENT_FINAL);
}

#[tokio::test]
async fn test_default_mechanism_falls_back_to_sha1() {
    let mut hello = reply::hello(2);
    hello.insert("saslSupportedMechs", vec!["SCRAM-SHA-1"]);
    let mut connection = MockConnection::new(1)
        .with_reply(hello)
        .with_reply(reply::sasl(1, SHA1_SERVER_FIRST, false))
        .with_reply(reply::sasl(1, SHA1_SERVER_FINAL, true));
    let probe = connection.probe();
    let initializer = initializer(Credential::default_mechanism("user", "pencil"), SHA1_NONCE);

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );

    let commands = probe.commands();
    assert_eq!(commands[0].command.get_str("saslSupportedMechs").unwrap(), "admin.user");
    assert_eq!(commands[1].command.get_str("mechanism").unwrap(), "SCRAM-SHA-1");
    assert_eq!(
        payload(&commands[2].command),
        b"c=biws,r=fyko+d2lbbFgONRv9qkxdawLHo+Vgk7qvUOKUwuWLIWg4l/9SraGMHEE,p=MC2T8BvbmWRckDw8oWl5IVghwCY="
    );
}

#[tokio::test]
async fn test_default_mechanism_uses_speculative_sha256() {
    let mut hello = reply::hello(2);
    hello.insert("saslSupportedMechs", vec!["SCRAM-SHA-1", "SCRAM-SHA-256"]);
    hello.insert(
        "speculativeAuthenticate",
        doc! { "conversationId": 1, "done": false, "payload": reply::binary(SHA256_SERVER_FIRST) },
    );
    let mut connection = MockConnection::new(1)
        .with_reply(hello)
        .with_reply(reply::sasl(1, SHA256_SERVER_FINAL, true));
    let probe = connection.probe();
    let initializer = initializer(Credential::default_mechanism("user", "pencil"), SHA256_NONCE);

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );
    assert_eq!(probe.command_names(), ["hello", "saslContinue"]);
}

#[tokio::test]
async fn test_default_mechanism_asks_for_mechanisms() {
    let mut mechs = reply::hello(2);
    mechs.insert("saslSupportedMechs", vec!["SCRAM-SHA-256"]);
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(2))
        .with_reply(mechs)
        .with_reply(reply::sasl(1, SHA256_SERVER_FIRST, false))
        .with_reply(reply::sasl(1, SHA256_SERVER_FINAL, true));
    let probe = connection.probe();
    let initializer = initializer(Credential::default_mechanism("user", "pencil"), SHA256_NONCE);

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );
    assert_eq!(
        probe.command_names(),
        ["hello", "hello", "saslStart", "saslContinue"]
    );
    assert_eq!(
        probe.commands()[1].command.get_str("saslSupportedMechs").unwrap(),
        "admin.user"
    );
}

#[tokio::test]
async fn test_bad_server_signature_fails_handshake() {
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(5))
        .with_reply(reply::sasl(1, SHA256_SERVER_FIRST, false))
        .with_reply(reply::sasl(1, b"v=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=", true));
    let initializer = initializer(
        Credential::scram(AuthMechanism::ScramSha256, "user", "pencil"),
        SHA256_NONCE,
    );

    let err = initializer
        .handshake(&mut connection, &CancellationToken::new())
        .await
        .unwrap_err();
    let HandshakeError::Authentication(auth) = err else {
        panic!("expected an authentication error, got {err:?}");
    };
    assert_eq!(auth.mechanism(), "SCRAM-SHA-256");
    assert!(!auth.is_network_error());
}

#[tokio::test]
async fn test_server_rejection_is_reported() {
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(5))
        .with_reply(reply::command_error(18, "AuthenticationFailed", "Authentication failed."));
    let initializer = initializer(Credential::plain("ldapuser", "secret"), "");

    let err = initializer
        .handshake(&mut connection, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("PLAIN"));
    assert!(err.to_string().contains("Authentication failed."));
}

#[tokio::test]
async fn test_plain_single_step() {
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(5))
        .with_reply(reply::sasl(1, b"", true));
    let probe = connection.probe();
    let initializer = initializer(Credential::plain("ldapuser", "secret"), "");

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );
    let commands = probe.commands();
    assert_eq!(probe.command_names(), ["hello", "saslStart"]);
    assert_eq!(commands[1].database, "$external");
    assert_eq!(payload(&commands[1].command), b"\0ldapuser\0secret");
}

#[tokio::test]
async fn test_x509_speculative_and_fallback() {
    let initializer = initializer(Credential::x509(Some("CN=client".into())), "");

    let mut hello = reply::hello(1);
    hello.insert("speculativeAuthenticate", doc! { "dbname": "$external", "user": "CN=client" });
    let mut speculative = MockConnection::new(1).with_reply(hello);
    let probe = speculative.probe();
    assert_ok!(
        initializer
            .handshake(&mut speculative, &CancellationToken::new())
            .await
    );
    assert_eq!(probe.command_names(), ["hello"]);

    let mut fallback = MockConnection::new(2)
        .with_reply(reply::hello(2))
        .with_reply(reply::ok());
    let probe = fallback.probe();
    assert_ok!(
        initializer
            .handshake(&mut fallback, &CancellationToken::new())
            .await
    );
    assert_eq!(probe.command_names(), ["hello", "authenticate"]);
    assert_eq!(probe.commands()[1].database, "$external");
}

#[tokio::test]
async fn test_mongodb_cr() {
    let mut connection = MockConnection::new(1)
        .with_reply(reply::hello(1))
        .with_reply(doc! { "ok": 1, "nonce": "2375531c32080ae8" })
        .with_reply(reply::ok());
    let probe = connection.probe();
    let initializer = initializer(Credential::mongodb_cr("user", "pencil"), "");

    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );
    let commands = probe.commands();
    assert_eq!(probe.command_names(), ["hello", "getnonce", "authenticate"]);
    assert_eq!(
        commands[2].command.get_str("key").unwrap(),
        "21742f26431831d5cfca035a08c5bdf6"
    );
}

#[tokio::test]
async fn test_load_balanced_requires_service_id() {
    let cancel = CancellationToken::new();
    let initializer = ConnectionInitializer::new().with_load_balanced(true);

    let mut missing = MockConnection::new(1);
    let err = initializer.handshake(&mut missing, &cancel).await.unwrap_err();
    assert!(matches!(err, HandshakeError::Connection(_)));

    let oid = ObjectId::new();
    let mut present = MockConnection::new(2).with_hello_reply(reply::hello_with_service(2, oid));
    let probe = present.probe();
    let description = assert_ok!(initializer.handshake(&mut present, &cancel).await);
    assert_eq!(description.service_id().map(|s| s.oid()), Some(oid));
    assert!(
        probe.commands()[0]
            .command
            .get_bool("loadBalanced")
            .unwrap()
    );
}

#[tokio::test]
async fn test_handshake_without_credentials_sends_metadata() {
    let initializer = ConnectionInitializer::new().with_app_name("reporting");
    let mut connection = MockConnection::new(1);
    let probe = connection.probe();
    assert_ok!(
        initializer
            .handshake(&mut connection, &CancellationToken::new())
            .await
    );

    let hello = &probe.commands()[0].command;
    assert!(hello.get_bool("helloOk").unwrap());
    assert!(!hello.contains_key("loadBalanced"));
    let client = hello.get_document("client").unwrap();
    assert_eq!(
        client.get_document("application").unwrap().get_str("name").unwrap(),
        "reporting"
    );
    assert!(connection.description().is_some());
}

#[tokio::test]
async fn test_cancelled_handshake() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut connection = MockConnection::new(1);
    let err = ConnectionInitializer::new()
        .handshake(&mut connection, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HandshakeError::Connection(mongo_protocol::ConnectionError::Cancelled)
    ));
}
