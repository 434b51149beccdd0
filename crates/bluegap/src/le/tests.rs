//! Unit tests for the LE security engine

use super::*;
use crate::context::GapContext;
use crate::error::GapError;
use crate::gap::{Address, AddressType, BdAddr, Role, SecurityResult};
use crate::hci::constants::{HCI_REMOTE_USER_TERMINATED, HCI_SUCCESS};
use crate::hci::{ControllerEvent, LeAdvertisingReport};
use crate::mocks::{self, addr, LinkCall, SmpCall};
use crate::smp::constants::*;
use crate::smp::{
    AuthRequirements, AuthenticationValue, ConnectionSignatureResolvingKey, EncryptionLevel,
    IdentityResolvingKey, KeyDistribution, LongTermKey, OobData, PairMethod, PairResult,
    PairedKeys, PairingFeatures, RawKeySet,
};
use std::sync::{Arc, Mutex};

const HANDLE_A: u16 = 0x0040;
const HANDLE_B: u16 = 0x0041;

#[derive(Debug, Clone, PartialEq)]
enum PairEvent {
    Features(Address, bool),
    Method(PairMethod),
    PasskeyShown(u32),
    ScOob(OobData),
    Keys(PairedKeys),
    Complete(Address, u8, bool),
}

#[derive(Clone, Default)]
struct PairLog {
    events: Arc<Mutex<Vec<PairEvent>>>,
    take_requests: bool,
}

impl PairLog {
    fn taking() -> Self {
        Self {
            take_requests: true,
            ..Default::default()
        }
    }

    fn events(&self) -> Vec<PairEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: PairEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl LePairCallback for PairLog {
    fn pair_feature_request(&mut self, addr: &Address, local_pair: bool) -> bool {
        self.push(PairEvent::Features(*addr, local_pair));
        self.take_requests
    }

    fn pair_method_notify(&mut self, _addr: &Address, method: PairMethod) {
        self.push(PairEvent::Method(method));
    }

    fn pair_passkey_notification(&mut self, _addr: &Address, passkey: u32) {
        self.push(PairEvent::PasskeyShown(passkey));
    }

    fn pair_passkey_request(&mut self, _addr: &Address) -> bool {
        self.take_requests
    }

    fn pair_sc_oob_request(&mut self, _addr: &Address) -> bool {
        self.take_requests
    }

    fn pair_sc_oob_notification(&mut self, _addr: &Address, data: &OobData) {
        self.push(PairEvent::ScOob(*data));
    }

    fn pair_user_confirm_request(&mut self, _addr: &Address, _numeric_value: u32) -> bool {
        self.take_requests
    }

    fn key_notify(&mut self, _addr: &Address, keys: &PairedKeys) {
        self.push(PairEvent::Keys(keys.clone()));
    }

    fn pair_complete(&mut self, addr: &Address, status: u8, authenticated: bool) {
        self.push(PairEvent::Complete(*addr, status, authenticated));
    }
}

#[derive(Clone, Default)]
struct KeyStore {
    remote_requests: Arc<Mutex<Vec<Address>>>,
    counters: Arc<Mutex<Vec<(SignCounterKind, u32)>>>,
}

impl LeSecurityCallback for KeyStore {
    fn remote_encryption_key_request(&mut self, addr: &Address) -> bool {
        self.remote_requests.lock().unwrap().push(*addr);
        true
    }

    fn sign_counter_change(&mut self, _addr: &Address, kind: SignCounterKind, counter: u32) {
        self.counters.lock().unwrap().push((kind, counter));
    }
}

#[derive(Clone, Default)]
struct Reports {
    seen: Arc<Mutex<Vec<(BdAddr, Option<Address>)>>>,
}

impl ReportSubscriber for Reports {
    fn on_report(&mut self, report: &LeAdvertisingReport, identity: Option<&Address>) {
        self.seen
            .lock()
            .unwrap()
            .push((report.address, identity.copied()));
    }
}

struct ParamsLog;

impl LeConnectionCallback for ParamsLog {
    fn connection_parameter_update_request(
        &mut self,
        _addr: &Address,
        params: &ConnectionParameters,
    ) -> bool {
        params.latency == 0
    }
}

fn peer(last: u8) -> Address {
    Address::public(addr(last))
}

fn connect(ctx: &mut GapContext, peer: Address, handle: u16, role: Role) {
    ctx.handle_controller_event(ControllerEvent::LeConnectionComplete {
        status: HCI_SUCCESS,
        handle,
        role: match role {
            Role::Central => 0x00,
            Role::Peripheral => 0x01,
        },
        peer_address_type: u8::from(peer.kind),
        peer_address: peer.addr,
    });
}

fn result_sink() -> (Arc<Mutex<Vec<SecurityResult>>>, LeSecurityResultCallback) {
    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    (
        results,
        Box::new(move |result| sink.lock().unwrap().push(result)),
    )
}

type SignatureLog = Arc<Mutex<Vec<(SignatureResult, [u8; SMP_SIGNATURE_LEN])>>>;

fn signature_sink(log: &SignatureLog) -> SignatureCallback {
    let log = log.clone();
    Box::new(move |result, signature| log.lock().unwrap().push((result, signature)))
}

fn signature_with_counter(counter: u32, fill: u8) -> [u8; SMP_SIGNATURE_LEN] {
    let mut signature = [fill; SMP_SIGNATURE_LEN];
    signature[..4].copy_from_slice(&counter.to_le_bytes());
    signature
}

fn csrk_with_counter(counter: u32) -> ConnectionSignatureResolvingKey {
    let mut csrk = ConnectionSignatureResolvingKey::new([0xC5; 16], true);
    csrk.sign_counter = counter;
    csrk
}

fn bonded_result(status: u8) -> PairResult {
    let identity = Address::new(addr(0xA0), AddressType::PublicIdentity);
    let raw = RawKeySet {
        ltk: LongTermKey::new([0x11; 16], 0x2233, 0x4455, 16),
        irk: [0x66; 16],
        identity,
        csrk: [0x77; 16],
    };
    PairResult {
        status,
        bonded: true,
        authenticated: true,
        key_size: 16,
        local_key_dist: KeyDistribution::ENC_KEY,
        peer_key_dist: KeyDistribution::ID_KEY | KeyDistribution::SIGN_KEY,
        local_keys: Some(raw.clone()),
        peer_keys: Some(raw),
    }
}

fn rpa(last: u8) -> BdAddr {
    BdAddr::new([last, 0x01, 0x02, 0x03, 0x04, 0x5F])
}

fn report(address: BdAddr, address_type: u8) -> LeAdvertisingReport {
    LeAdvertisingReport {
        event_type: 0x00,
        address_type,
        address,
        data: vec![0x02, 0x01, 0x06],
        rssi: -50,
    }
}

#[test]
fn test_pairing_lock_serializes_local_pairings() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));

    ctx.le_pair(peer(1)).unwrap();
    assert_eq!(recorder.links(), vec![LinkCall::LeConnect(peer(1))]);
    assert_eq!(ctx.le_pair(peer(2)), Err(GapError::InvalidState));
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(1)));

    // The link comes up and the pairing starts on it
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    assert_eq!(pairing.events(), vec![PairEvent::Features(peer(1), true)]);
    assert_eq!(
        ctx.le().connections.get(&peer(1).addr).unwrap().security_status,
        LeSecurityStatus::Pair
    );

    ctx.le_on_pair_result(HANDLE_A, PairResult::failed(SMP_REASON_CONFIRM_VALUE_FAILED));
    assert!(!ctx.le().pairing_lock.is_held());
    assert_eq!(
        pairing.events().last(),
        Some(&PairEvent::Complete(peer(1), SMP_REASON_CONFIRM_VALUE_FAILED, false))
    );

    ctx.le_pair(peer(2)).unwrap();
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(2)));
}

#[test]
fn test_pair_without_feature_client_releases_lock() {
    let (mut ctx, _recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    assert_eq!(ctx.le_pair(peer(1)), Err(GapError::NotSupported));
    assert!(!ctx.le().pairing_lock.is_held());
}

#[test]
fn test_failed_connection_aborts_pairing() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));

    ctx.le_pair(peer(1)).unwrap();
    ctx.handle_controller_event(ControllerEvent::LeConnectionComplete {
        status: 0x3E,
        handle: 0,
        role: 0x00,
        peer_address_type: 0x00,
        peer_address: peer(1).addr,
    });

    assert!(!ctx.le().pairing_lock.is_held());
    assert_eq!(pairing.events(), vec![PairEvent::Complete(peer(1), 0x3E, false)]);
}

#[test]
fn test_cancel_before_connection() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));

    ctx.le_pair(peer(1)).unwrap();
    ctx.le_cancel_pair(peer(1)).unwrap();

    assert!(recorder.links().contains(&LinkCall::LeCancelConnect(peer(1))));
    assert!(!ctx.le().pairing_lock.is_held());
    assert_eq!(
        pairing.events(),
        vec![PairEvent::Complete(peer(1), SMP_REASON_UNSPECIFIED_REASON, false)]
    );
}

#[test]
fn test_feature_reply_applies_local_policy() {
    let (mut ctx, recorder) = mocks::context();
    ctx.register_le_pair_callback(Box::new(PairLog::taking()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_pair(peer(1)).unwrap();

    ctx.le_pair_feature_rsp(peer(1), PairingFeatures::default()).unwrap();

    let expected = PairingFeatures {
        auth_req: AuthRequirements::new(false, false, true),
        initiator_key_dist: KeyDistribution::ID_KEY,
        responder_key_dist: KeyDistribution::ID_KEY,
        ..PairingFeatures::default()
    };
    assert_eq!(recorder.smp(), vec![SmpCall::StartPair(HANDLE_A, expected)]);
}

#[test]
fn test_peripheral_feature_reply_answers_request() {
    let (mut ctx, recorder) = mocks::context();
    ctx.register_le_pair_callback(Box::new(PairLog::taking()));
    ctx.le_set_bondable_mode(true).unwrap();
    ctx.le_set_security_mode(3, 1).unwrap();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Peripheral);

    ctx.le_on_remote_pair_request(HANDLE_A, PairingFeatures::default());
    assert!(recorder.smp().is_empty());
    ctx.le_pair_feature_rsp(peer(1), PairingFeatures::default()).unwrap();

    let expected = PairingFeatures {
        auth_req: AuthRequirements::new(true, true, true),
        ..PairingFeatures::default()
    };
    assert_eq!(
        recorder.smp(),
        vec![SmpCall::PairRequestReply(HANDLE_A, Ok(expected))]
    );
}

#[test]
fn test_remote_pair_request_checks() {
    let (mut ctx, recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Peripheral);

    let small = PairingFeatures {
        max_key_size: 6,
        ..PairingFeatures::default()
    };
    ctx.le_on_remote_pair_request(HANDLE_A, small);
    ctx.le_on_remote_pair_request(HANDLE_A, PairingFeatures::default());

    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::PairRequestReply(HANDLE_A, Err(SMP_REASON_ENCRYPTION_KEY_SIZE)),
            SmpCall::PairRequestReply(HANDLE_A, Err(SMP_REASON_PAIRING_NOT_SUPPORTED)),
        ]
    );
}

#[test]
fn test_pair_response_needs_mitm_under_strict_policy() {
    let (mut ctx, recorder) = mocks::context();
    ctx.le_set_security_mode(1, 2).unwrap();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_remote_pair_response(HANDLE_A, PairingFeatures::default());
    let mitm = PairingFeatures {
        auth_req: AuthRequirements::new(true, true, true),
        ..PairingFeatures::default()
    };
    ctx.le_on_remote_pair_response(HANDLE_A, mitm);

    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::PairResponseReply(HANDLE_A, Err(SMP_REASON_AUTHENTICATION_REQUIREMENTS)),
            SmpCall::PairResponseReply(HANDLE_A, Ok(())),
        ]
    );
}

#[test]
fn test_just_works_refused_when_authentication_required() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    ctx.le_set_security_mode(3, 1).unwrap();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_authentication_request(HANDLE_A, PairMethod::JustWorks, Vec::new());

    assert_eq!(
        recorder.smp(),
        vec![SmpCall::AuthReply(
            HANDLE_A,
            PairMethod::JustWorks,
            Err(SMP_REASON_AUTHENTICATION_REQUIREMENTS)
        )]
    );
    assert!(pairing.events().is_empty());
}

#[test]
fn test_authentication_request_without_client_is_rejected() {
    let (mut ctx, recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_authentication_request(HANDLE_A, PairMethod::PasskeyEntry, Vec::new());

    assert_eq!(
        recorder.smp(),
        vec![SmpCall::AuthReply(
            HANDLE_A,
            PairMethod::PasskeyEntry,
            Err(SMP_REASON_UNSPECIFIED_REASON)
        )]
    );
}

#[test]
fn test_just_works_and_passkey_display_are_answered() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_authentication_request(HANDLE_A, PairMethod::JustWorks, Vec::new());
    ctx.le_on_authentication_request(
        HANDLE_A,
        PairMethod::PasskeyDisplay,
        123_456u32.to_le_bytes().to_vec(),
    );

    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::AuthReply(HANDLE_A, PairMethod::JustWorks, Ok(AuthenticationValue::Confirm)),
            SmpCall::AuthReply(
                HANDLE_A,
                PairMethod::PasskeyDisplay,
                Ok(AuthenticationValue::Passkey(123_456))
            ),
        ]
    );
    assert_eq!(
        pairing.events(),
        vec![
            PairEvent::Method(PairMethod::JustWorks),
            PairEvent::Method(PairMethod::PasskeyDisplay),
            PairEvent::PasskeyShown(123_456),
        ]
    );
}

#[test]
fn test_passkey_entry_waits_for_client() {
    let (mut ctx, recorder) = mocks::context();
    ctx.register_le_pair_callback(Box::new(PairLog::taking()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    assert_eq!(
        ctx.le_pair_passkey_rsp(peer(1), true, 1),
        Err(GapError::InvalidState)
    );
    ctx.le_on_authentication_request(HANDLE_A, PairMethod::PasskeyEntry, Vec::new());
    assert!(recorder.smp().is_empty());

    assert!(matches!(
        ctx.le_pair_passkey_rsp(peer(1), true, 1_000_000),
        Err(GapError::InvalidParameter(_))
    ));
    ctx.le_pair_passkey_rsp(peer(1), true, 42).unwrap();
    ctx.le_pair_passkey_rsp(peer(1), false, 0).unwrap();

    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::AuthReply(
                HANDLE_A,
                PairMethod::PasskeyEntry,
                Ok(AuthenticationValue::Passkey(42))
            ),
            SmpCall::AuthReply(
                HANDLE_A,
                PairMethod::PasskeyEntry,
                Err(SMP_REASON_PASSKEY_ENTRY_FAILED)
            ),
        ]
    );
}

#[test]
fn test_sc_oob_local_values_are_notified() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let mut blob = vec![0u8; SMP_SC_OOB_DATA_LEN];
    blob[SMP_SC_OOB_RANDOM_OFFSET..SMP_SC_OOB_RANDOM_OFFSET + 16].fill(0xAA);
    blob[SMP_SC_OOB_CONFIRM_OFFSET..SMP_SC_OOB_CONFIRM_OFFSET + 16].fill(0xCC);
    ctx.le_on_authentication_request(HANDLE_A, PairMethod::OobScBothSendRecv, blob);

    let local = OobData {
        r: [0xAA; 16],
        c: [0xCC; 16],
    };
    assert!(pairing.events().contains(&PairEvent::ScOob(local)));

    let remote = OobData {
        r: [0x01; 16],
        c: [0x02; 16],
    };
    ctx.le_pair_sc_oob_rsp(peer(1), true, remote).unwrap();
    assert_eq!(
        recorder.smp(),
        vec![SmpCall::AuthReply(
            HANDLE_A,
            PairMethod::OobScBothSendRecv,
            Ok(AuthenticationValue::ScOob {
                peer: peer(1).addr,
                data: remote,
            })
        )]
    );
}

#[test]
fn test_numeric_comparison_reject_reason() {
    let (mut ctx, recorder) = mocks::context();
    ctx.register_le_pair_callback(Box::new(PairLog::taking()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_authentication_request(
        HANDLE_A,
        PairMethod::NumericComparison,
        654_321u32.to_le_bytes().to_vec(),
    );
    assert_eq!(
        ctx.le_pair_sc_oob_rsp(peer(1), true, OobData::default()),
        Err(GapError::InvalidState)
    );
    ctx.le_pair_sc_user_confirm_rsp(peer(1), false).unwrap();

    assert_eq!(
        recorder.smp(),
        vec![SmpCall::AuthReply(
            HANDLE_A,
            PairMethod::NumericComparison,
            Err(SMP_REASON_NUMERIC_COMPARISON_FAILED)
        )]
    );
}

#[test]
fn test_bonded_pairing_reports_filtered_keys() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_pair(peer(1)).unwrap();

    ctx.le_on_pair_result(HANDLE_A, bonded_result(SMP_SUCCESS));

    let events = pairing.events();
    let keys = events
        .iter()
        .find_map(|event| match event {
            PairEvent::Keys(keys) => Some(keys.clone()),
            _ => None,
        })
        .unwrap();
    assert!(keys.local.ltk.is_some());
    assert!(keys.local.irk.is_none());
    assert!(keys.remote.ltk.is_none());
    assert!(keys.remote.irk.is_some());
    assert!(keys.remote.csrk.is_some());
    assert_eq!(
        events.last(),
        Some(&PairEvent::Complete(peer(1), SMP_SUCCESS, true))
    );

    // The peer's keys are kept for signing and address resolution
    assert!(ctx.le_signing_keys(&peer(1).addr).unwrap().remote.is_some());
    assert_eq!(ctx.le().irks.len(), 1);
    // No encryption change has been seen on the link yet
    let conn = ctx.le().connections.get(&peer(1).addr).unwrap();
    assert_eq!(conn.encryption_level, EncryptionLevel::None);
    assert!(conn.key_authenticated);
}

#[test]
fn test_unbonded_pairing_keeps_keys_private() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let mut result = bonded_result(SMP_SUCCESS);
    result.bonded = false;
    ctx.le_on_pair_result(HANDLE_A, result);

    assert!(!pairing
        .events()
        .iter()
        .any(|event| matches!(event, PairEvent::Keys(_))));
    assert!(ctx.le().irks.is_empty());
}

#[test]
fn test_disconnect_during_pairing_reports_reason() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_pair(peer(1)).unwrap();
    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, Some(callback))
        .unwrap();

    ctx.handle_controller_event(ControllerEvent::DisconnectionComplete {
        status: HCI_SUCCESS,
        handle: HANDLE_A,
        reason: HCI_REMOTE_USER_TERMINATED,
    });

    assert!(!ctx.le().pairing_lock.is_held());
    assert!(ctx.le().connections.is_empty());
    assert_eq!(
        pairing.events().last(),
        Some(&PairEvent::Complete(peer(1), HCI_REMOTE_USER_TERMINATED, false))
    );
    assert_eq!(
        *results.lock().unwrap(),
        vec![SecurityResult::Controller(HCI_REMOTE_USER_TERMINATED)]
    );
}

#[test]
fn test_security_request_resolves_immediately_when_met() {
    let (mut ctx, _recorder) = mocks::context();
    let (results, callback) = result_sink();
    assert!(matches!(
        ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, None),
        Err(GapError::InvalidState)
    ));

    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_request_security(peer(1), EncryptionLevel::None, Some(callback))
        .unwrap();
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Success]);
}

#[test]
fn test_central_encrypts_with_stored_key() {
    let (mut ctx, recorder) = mocks::context();
    let store = KeyStore::default();
    ctx.register_le_security_callback(Box::new(store.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, Some(callback))
        .unwrap();
    assert_eq!(*store.remote_requests.lock().unwrap(), vec![peer(1)]);
    assert_eq!(
        ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, None),
        Err(GapError::InvalidState)
    );

    let ltk = LongTermKey::new([0x42; 16], 0x1111, 0x2222, 16);
    ctx.le_remote_encryption_key_rsp(peer(1), true, ltk.clone(), false)
        .unwrap();
    assert_eq!(recorder.smp(), vec![SmpCall::StartEncryption(HANDLE_A, ltk)]);

    ctx.handle_controller_event(ControllerEvent::EncryptionChange {
        status: HCI_SUCCESS,
        handle: HANDLE_A,
        enabled: true,
    });
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Success]);
    assert_eq!(
        ctx.le_get_security_status(&peer(1)),
        Ok(EncryptionLevel::Unauthenticated)
    );
}

#[test]
fn test_unauthenticated_stored_key_leads_to_pairing() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_security_callback(Box::new(KeyStore::default()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Authenticated, Some(callback))
        .unwrap();
    // The pairing client shows up late; the stored-key path was used
    ctx.register_le_pair_callback(Box::new(pairing.clone()));

    let ltk = LongTermKey::new([0x42; 16], 0, 0, 16);
    ctx.le_remote_encryption_key_rsp(peer(1), true, ltk, false)
        .unwrap();
    assert!(recorder.smp().is_empty());
    assert_eq!(pairing.events(), vec![PairEvent::Features(peer(1), true)]);
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(1)));

    // A running pairing resolves the request with its own result
    ctx.handle_controller_event(ControllerEvent::EncryptionChange {
        status: HCI_SUCCESS,
        handle: HANDLE_A,
        enabled: true,
    });
    assert!(results.lock().unwrap().is_empty());
    ctx.le_on_pair_result(HANDLE_A, bonded_result(SMP_SUCCESS));
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Success]);
}

#[test]
fn test_request_without_clients_is_not_supported() {
    let (mut ctx, _recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    let (results, callback) = result_sink();

    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, Some(callback))
        .unwrap();
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::NotSupported]);
}

#[test]
fn test_peripheral_asks_central_to_secure() {
    let (mut ctx, recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Peripheral);

    ctx.le_request_security(peer(1), EncryptionLevel::Authenticated, None)
        .unwrap();
    assert_eq!(
        recorder.smp(),
        vec![SmpCall::SendSecurityRequest(
            HANDLE_A,
            AuthRequirements::new(false, true, true)
        )]
    );
}

#[test]
fn test_peer_requests_without_clients_are_refused() {
    let (mut ctx, recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    connect(&mut ctx, peer(2), HANDLE_B, Role::Peripheral);

    ctx.le_on_remote_security_request(HANDLE_A, AuthRequirements::new(true, false, true));
    ctx.le_on_long_term_key_request(HANDLE_B, 0x1234, 0x56);

    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::SecurityRequestReply(HANDLE_A, Err(SMP_REASON_PAIRING_NOT_SUPPORTED)),
            SmpCall::LtkReply(HANDLE_B, None),
        ]
    );
    assert!(ctx.le().connections.get(&peer(1).addr).unwrap().is_remote_security_request);
}

#[test]
fn test_connection_parameter_update() {
    let (mut ctx, recorder) = mocks::context();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    let params = ConnectionParameters {
        interval_min: 6,
        interval_max: 12,
        latency: 0,
        timeout: 100,
    };

    ctx.le_on_connection_parameter_request(HANDLE_A, 7, params);
    assert_eq!(
        recorder.links(),
        vec![LinkCall::ParamUpdateReply {
            handle: HANDLE_A,
            identifier: 7,
            accept: false,
        }]
    );

    recorder.clear();
    ctx.register_le_connection_callback(Box::new(ParamsLog));
    ctx.le_on_connection_parameter_request(HANDLE_A, 8, params);
    assert!(recorder.links().is_empty());
    ctx.le_connection_parameter_update_rsp(peer(1), true).unwrap();
    assert_eq!(
        recorder.links(),
        vec![LinkCall::ParamUpdateReply {
            handle: HANDLE_A,
            identifier: 8,
            accept: true,
        }]
    );
    assert_eq!(
        ctx.le_connection_parameter_update_rsp(peer(1), true),
        Err(GapError::InvalidState)
    );
}

#[test]
fn test_settings_are_validated() {
    let (mut ctx, _recorder) = mocks::context();
    assert!(ctx.le_set_security_mode(5, 1).is_err());
    assert!(ctx.le_set_security_mode(1, 3).is_err());
    assert!(ctx.le_set_min_enc_key_size(6).is_err());
    assert!(ctx.le_set_min_enc_key_size(17).is_err());
    ctx.le_set_min_enc_key_size(16).unwrap();
    assert_eq!(ctx.le().settings.min_key_size, 16);

    ctx.set_le_enabled(false);
    assert_eq!(ctx.le_pair(peer(1)), Err(GapError::NotEnabled));
    assert_eq!(ctx.le_set_bondable_mode(true), Err(GapError::NotEnabled));
}

#[test]
fn test_replayed_signature_is_refused() {
    let (mut ctx, recorder) = mocks::context();
    let log = SignatureLog::default();
    ctx.le_set_signing_info(peer(1), None, Some(csrk_with_counter(5)))
        .unwrap();

    let stale = signature_with_counter(3, 0xEE);
    assert_eq!(
        ctx.le_confirm_signature(peer(1), vec![1, 2, 3], stale, Some(signature_sink(&log))),
        Err(GapError::Replay)
    );
    assert!(recorder.smp().is_empty());
    assert_eq!(
        *log.lock().unwrap(),
        vec![(SignatureResult::CounterBehind, stale)]
    );
}

#[test]
fn test_confirmed_signature_advances_remote_counter() {
    let (mut ctx, recorder) = mocks::context();
    let store = KeyStore::default();
    ctx.register_le_security_callback(Box::new(store.clone()));
    let log = SignatureLog::default();
    ctx.le_set_signing_info(peer(1), None, Some(csrk_with_counter(5)))
        .unwrap();

    let signature = signature_with_counter(5, 0xEE);
    ctx.le_confirm_signature(peer(1), vec![1, 2, 3], signature, Some(signature_sink(&log)))
        .unwrap();
    assert_eq!(
        recorder.smp(),
        vec![SmpCall::Sign {
            csrk: [0xC5; 16],
            counter: 5,
            data: vec![1, 2, 3],
        }]
    );

    ctx.le_on_signature_result(SMP_SUCCESS, signature);
    assert_eq!(
        *log.lock().unwrap(),
        vec![(SignatureResult::Success, signature)]
    );
    let remote = ctx.le_signing_keys(&peer(1).addr).unwrap().remote.clone();
    assert_eq!(remote.unwrap().sign_counter, 6);
    assert_eq!(
        *store.counters.lock().unwrap(),
        vec![(SignCounterKind::Remote, 6)]
    );

    // The same counter is now a replay
    assert_eq!(
        ctx.le_confirm_signature(peer(1), vec![1, 2, 3], signature, None),
        Err(GapError::Replay)
    );
}

#[test]
fn test_signature_mismatch_keeps_counter() {
    let (mut ctx, _recorder) = mocks::context();
    let log = SignatureLog::default();
    ctx.le_set_signing_info(peer(1), None, Some(csrk_with_counter(0)))
        .unwrap();

    let received = signature_with_counter(2, 0xEE);
    ctx.le_confirm_signature(peer(1), vec![9], received, Some(signature_sink(&log)))
        .unwrap();
    let computed = signature_with_counter(2, 0xDD);
    ctx.le_on_signature_result(SMP_SUCCESS, computed);

    assert_eq!(
        *log.lock().unwrap(),
        vec![(SignatureResult::AlgorithmMismatch, computed)]
    );
    let remote = ctx.le_signing_keys(&peer(1).addr).unwrap().remote.clone();
    assert_eq!(remote.unwrap().sign_counter, 0);
}

#[test]
fn test_signing_jobs_run_one_at_a_time() {
    let (mut ctx, recorder) = mocks::context();
    let log = SignatureLog::default();

    assert_eq!(
        ctx.le_generate_signature(peer(1), vec![1], None),
        Err(GapError::InvalidState)
    );
    ctx.le_set_signing_info(peer(1), Some(csrk_with_counter(0)), None)
        .unwrap();

    ctx.le_generate_signature(peer(1), vec![1], Some(signature_sink(&log)))
        .unwrap();
    ctx.le_generate_signature(peer(1), vec![2], Some(signature_sink(&log)))
        .unwrap();
    assert_eq!(recorder.smp().len(), 1);
    assert!(ctx.le().signatures.is_in_flight());

    ctx.le_on_signature_result(SMP_SUCCESS, signature_with_counter(0, 0x10));
    assert_eq!(
        recorder.smp().last(),
        Some(&SmpCall::Sign {
            csrk: [0xC5; 16],
            counter: 1,
            data: vec![2],
        })
    );

    ctx.le_on_signature_result(0x01, [0; SMP_SIGNATURE_LEN]);
    let results: Vec<_> = log.lock().unwrap().iter().map(|(result, _)| *result).collect();
    assert_eq!(
        results,
        vec![SignatureResult::Success, SignatureResult::ExecutionError]
    );
    let local = ctx.le_signing_keys(&peer(1).addr).unwrap().local.clone();
    assert_eq!(local.unwrap().sign_counter, 1);
    assert!(!ctx.le().signatures.is_in_flight());
}

#[test]
fn test_disconnect_fails_queued_signatures_only() {
    let (mut ctx, _recorder) = mocks::context();
    let log = SignatureLog::default();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_set_signing_info(peer(1), Some(csrk_with_counter(0)), None)
        .unwrap();

    ctx.le_generate_signature(peer(1), vec![1], Some(signature_sink(&log)))
        .unwrap();
    ctx.le_generate_signature(peer(1), vec![2], Some(signature_sink(&log)))
        .unwrap();

    ctx.handle_controller_event(ControllerEvent::DisconnectionComplete {
        status: HCI_SUCCESS,
        handle: HANDLE_A,
        reason: HCI_REMOTE_USER_TERMINATED,
    });
    assert_eq!(
        *log.lock().unwrap(),
        vec![(SignatureResult::ExecutionError, [0; SMP_SIGNATURE_LEN])]
    );
    assert_eq!(ctx.le().signatures.len(), 1);

    // The in-flight job still completes
    ctx.le_on_signature_result(SMP_SUCCESS, signature_with_counter(0, 0x10));
    assert_eq!(log.lock().unwrap().len(), 2);
    assert!(ctx.le().signatures.is_empty());
}

#[test]
fn test_private_address_resolution_walks_candidates() {
    let (mut ctx, recorder) = mocks::context();
    let reports = Reports::default();
    ctx.register_report_subscriber(Box::new(reports.clone()));
    let first = IdentityResolvingKey::new([0x01; 16], peer(0xB1));
    let second = IdentityResolvingKey::new([0x02; 16], peer(0xB2));
    ctx.le_add_identity_resolving_key(first).unwrap();
    ctx.le_add_identity_resolving_key(second).unwrap();

    ctx.le_on_advertising_report(report(rpa(1), 0x01));
    ctx.le_on_advertising_report(report(rpa(2), 0x01));
    assert_eq!(
        recorder.smp(),
        vec![SmpCall::Resolve {
            addr: rpa(1),
            irk: [0x01; 16],
        }]
    );
    assert!(ctx.le().rpa.is_processing());

    ctx.le_on_resolve_result(SMP_SUCCESS, false);
    ctx.le_on_resolve_result(SMP_SUCCESS, true);
    assert_eq!(
        *reports.seen.lock().unwrap(),
        vec![(rpa(1), Some(peer(0xB2)))]
    );
    assert_eq!(
        ctx.le_current_address(&peer(0xB2).addr),
        Some(Address::new(rpa(1), AddressType::Random))
    );

    // The second report starts over with the first candidate
    assert_eq!(
        recorder.smp().last(),
        Some(&SmpCall::Resolve {
            addr: rpa(2),
            irk: [0x01; 16],
        })
    );
    ctx.le_on_resolve_result(SMP_SUCCESS, false);
    ctx.le_on_resolve_result(SMP_SUCCESS, false);
    assert_eq!(reports.seen.lock().unwrap().last(), Some(&(rpa(2), None)));
    assert!(!ctx.le().rpa.is_processing());
    assert!(ctx.le().rpa.is_empty());
    assert_eq!(recorder.smp().len(), 4);
}

#[test]
fn test_plain_reports_pass_through() {
    let (mut ctx, recorder) = mocks::context();
    let reports = Reports::default();
    ctx.register_report_subscriber(Box::new(reports.clone()));
    ctx.le_add_identity_resolving_key(IdentityResolvingKey::new([0x01; 16], peer(0xB1)))
        .unwrap();

    // Public address, then a random static one
    ctx.le_on_advertising_report(report(addr(1), 0x00));
    ctx.le_on_advertising_report(report(BdAddr::new([1, 2, 3, 4, 5, 0xC0]), 0x01));

    assert_eq!(reports.seen.lock().unwrap().len(), 2);
    assert!(recorder.smp().is_empty());
}

#[test]
fn test_resolution_without_irks_delivers_unresolved() {
    let (mut ctx, recorder) = mocks::context();
    let reports = Reports::default();
    ctx.register_report_subscriber(Box::new(reports.clone()));

    ctx.le_on_advertising_report(report(rpa(1), 0x01));

    assert_eq!(*reports.seen.lock().unwrap(), vec![(rpa(1), None)]);
    assert!(recorder.smp().is_empty());
}

#[test]
fn test_removed_irk_forgets_address() {
    let (mut ctx, _recorder) = mocks::context();
    ctx.le_add_identity_resolving_key(IdentityResolvingKey::new([0x01; 16], peer(0xB1)))
        .unwrap();
    ctx.le_on_advertising_report(report(rpa(1), 0x01));
    ctx.le_on_resolve_result(SMP_SUCCESS, true);
    assert!(ctx.le_current_address(&peer(0xB1).addr).is_some());

    ctx.le_remove_identity_resolving_key(&peer(0xB1)).unwrap();
    assert!(ctx.le_current_address(&peer(0xB1).addr).is_none());
    assert!(ctx.le().irks.is_empty());
}

#[test]
fn test_stored_key_answers_peer_security_request() {
    let (mut ctx, recorder) = mocks::context();
    let store = KeyStore::default();
    ctx.register_le_security_callback(Box::new(store.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_on_remote_security_request(HANDLE_A, AuthRequirements::new(true, true, true));
    assert_eq!(*store.remote_requests.lock().unwrap(), vec![peer(1)]);
    assert!(recorder.smp().is_empty());

    let ltk = LongTermKey::new([0x42; 16], 0x0101, 0x0202, 16);
    ctx.le_remote_encryption_key_rsp(peer(1), true, ltk.clone(), true)
        .unwrap();
    assert_eq!(
        recorder.smp(),
        vec![
            SmpCall::SecurityRequestReply(HANDLE_A, Ok(())),
            SmpCall::StartEncryption(HANDLE_A, ltk),
        ]
    );
}

#[test]
fn test_stored_key_without_peer_request_sends_no_reply() {
    let (mut ctx, recorder) = mocks::context();
    ctx.register_le_security_callback(Box::new(KeyStore::default()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);
    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, None)
        .unwrap();

    let ltk = LongTermKey::new([0x42; 16], 0, 0, 16);
    ctx.le_remote_encryption_key_rsp(peer(1), true, ltk.clone(), false)
        .unwrap();
    assert_eq!(recorder.smp(), vec![SmpCall::StartEncryption(HANDLE_A, ltk)]);
}

#[test]
fn test_security_request_pairing_holds_lock() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, None)
        .unwrap();
    assert_eq!(pairing.events(), vec![PairEvent::Features(peer(1), true)]);
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(1)));
    assert_eq!(ctx.le_pair(peer(2)), Err(GapError::InvalidState));

    ctx.le_on_pair_result(HANDLE_A, PairResult::failed(SMP_REASON_CONFIRM_VALUE_FAILED));
    assert!(!ctx.le().pairing_lock.is_held());
    ctx.le_pair(peer(2)).unwrap();
}

#[test]
fn test_declined_stored_key_fails_while_lock_busy() {
    let (mut ctx, recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_security_callback(Box::new(KeyStore::default()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    // Another peer holds the lock while its link is being set up
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    ctx.le_pair(peer(2)).unwrap();

    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, Some(callback))
        .unwrap();
    assert!(results.lock().unwrap().is_empty());

    ctx.le_remote_encryption_key_rsp(peer(1), false, LongTermKey::new([0; 16], 0, 0, 16), false)
        .unwrap();
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Failed]);
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(2)));
    assert!(pairing.events().is_empty());
    assert!(recorder.smp().is_empty());
}

#[test]
fn test_busy_lock_without_stored_key_fails_request() {
    let (mut ctx, _recorder) = mocks::context();
    let pairing = PairLog::taking();
    ctx.register_le_pair_callback(Box::new(pairing.clone()));
    ctx.le_pair(peer(2)).unwrap();
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Unauthenticated, Some(callback))
        .unwrap();

    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Failed]);
    assert!(pairing.events().is_empty());
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(2)));
}

#[test]
fn test_pair_result_before_encryption_leaves_request_pending() {
    let (mut ctx, _recorder) = mocks::context();
    ctx.register_le_pair_callback(Box::new(PairLog::taking()));
    connect(&mut ctx, peer(1), HANDLE_A, Role::Central);

    let (results, callback) = result_sink();
    ctx.le_request_security(peer(1), EncryptionLevel::Authenticated, Some(callback))
        .unwrap();
    ctx.le_on_pair_result(HANDLE_A, bonded_result(SMP_SUCCESS));
    assert!(results.lock().unwrap().is_empty());
    assert_eq!(
        ctx.le_get_security_status(&peer(1)),
        Ok(EncryptionLevel::None)
    );

    ctx.handle_controller_event(ControllerEvent::EncryptionChange {
        status: HCI_SUCCESS,
        handle: HANDLE_A,
        enabled: true,
    });
    assert_eq!(*results.lock().unwrap(), vec![SecurityResult::Success]);
    assert_eq!(
        ctx.le_get_security_status(&peer(1)),
        Ok(EncryptionLevel::Authenticated)
    );
}

#[test]
fn test_queued_confirmation_with_same_counter_is_refused() {
    let (mut ctx, recorder) = mocks::context();
    let log = SignatureLog::default();
    ctx.le_set_signing_info(peer(1), None, Some(csrk_with_counter(5)))
        .unwrap();

    let signature = signature_with_counter(5, 0xEE);
    ctx.le_confirm_signature(peer(1), vec![1], signature, Some(signature_sink(&log)))
        .unwrap();
    ctx.le_confirm_signature(peer(1), vec![1], signature, Some(signature_sink(&log)))
        .unwrap();
    assert_eq!(recorder.smp().len(), 1);

    ctx.le_on_signature_result(SMP_SUCCESS, signature);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            (SignatureResult::Success, signature),
            (SignatureResult::CounterBehind, signature),
        ]
    );
    assert_eq!(recorder.smp().len(), 1);
    assert!(!ctx.le().signatures.is_in_flight());
    assert!(ctx.le().signatures.is_empty());
}

#[test]
fn test_pairing_guard_releases_unless_committed() {
    let (mut ctx, _recorder) = mocks::context();

    let guard = pairing::PairingGuard::acquire(&mut ctx, peer(1)).unwrap();
    assert_eq!(guard.le.pairing_lock.holder(), Some(peer(1)));
    drop(guard);
    assert!(!ctx.le().pairing_lock.is_held());

    pairing::PairingGuard::acquire(&mut ctx, peer(1))
        .unwrap()
        .commit();
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(1)));
    assert!(pairing::PairingGuard::acquire(&mut ctx, peer(2)).is_err());
    assert_eq!(ctx.le().pairing_lock.holder(), Some(peer(1)));
}
