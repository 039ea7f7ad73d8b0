//! Stable message names of the built-in BTE catalog

/// Reference value, operating state, control mode, reset flags and inner
/// resistance in one composite register
pub const SET_REF_SWITCH_CTRL_RI: &str = "SET_REF_SWITCH_CTRL_RI";
pub const SET_SLOPE_U_I: &str = "SET_SLOPE_U_I";
pub const SET_SLOPE_PWR_FILTER: &str = "SET_SLOPE_PWR_FILTER";
pub const SET_OP_LIM_U: &str = "SET_OP_LIM_U";
pub const SET_OP_LIM_I: &str = "SET_OP_LIM_I";
pub const SET_OP_LIM_PWR: &str = "SET_OP_LIM_PWR";
pub const SET_PR_LIM_U: &str = "SET_PR_LIM_U";
pub const SET_PR_LIM_I: &str = "SET_PR_LIM_I";
pub const SET_PR_LIM_PWR: &str = "SET_PR_LIM_PWR";
pub const CLEARANCE: &str = "CLEARANCE";
pub const SET_RST_STOP: &str = "SET_RST_STOP";
pub const REQ_SYSTEM_STATUS: &str = "REQ_SYSTEM_STATUS";
pub const REQ_SYSTEM_INFO: &str = "REQ_SYSTEM_INFO";
