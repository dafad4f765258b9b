//! ND's state and event vocabulary, grounded on `ucs_nodedis.c`'s `Nd_StateType`/`Nd_EventType`
//! and the accompanying `nd_trans_tab`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdState {
    Idle,
    CheckHello,
    WaitEval,
    WaitWelcome,
    WaitPing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdEvent {
    Start,
    Stop,
    Check,
    NetOff,
    HelloStatus,
    ResNodeOk,
    ResUnknown,
    ResCheckUnique,
    WelcomeSuccess,
    WelcomeNoSuccess,
    SignatureSuccess,
    Timeout,
    SignatureError,
}

/// Outcome delivered to the application's report callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NdReportCode {
    Unknown,
    WelcomeSuccess,
    Multi,
    Stopped,
    NetOff,
    Error,
}
