// Pure authorization primitive: given the SAE identities bound to a key
// record and who is asking, decide allow/deny. No I/O, no side effects —
// the storage engine calls this once it has a record in hand.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOperation {
    /// enc_keys / Get Status: the master SAE created or is querying the key.
    MasterAccess,
    /// dec_keys: a slave (primary or additional) is retrieving the key.
    SlaveRetrieval,
}

/// `(master, slave, additional_slaves)` bound to a key record.
pub struct KeyOwnership<'a> {
    pub master_sae_id: &'a str,
    pub slave_sae_id: &'a str,
    pub additional_slave_sae_ids: &'a [String],
}

/// Is `requester` authorized to touch a key record with the given
/// ownership, for the given operation?
pub fn is_authorized(owner: &KeyOwnership<'_>, requester: &str, op: KeyOperation) -> bool {
    if requester == owner.master_sae_id {
        return true;
    }
    match op {
        KeyOperation::SlaveRetrieval => {
            requester == owner.slave_sae_id
                || owner.additional_slave_sae_ids.iter().any(|s| s == requester)
        }
        KeyOperation::MasterAccess => false,
    }
}

/// For dec_keys, the URL path names the alleged master SAE; the record's
/// actual master must match it.
pub fn master_matches_path(owner: &KeyOwnership<'_>, alleged_master: &str) -> bool {
    owner.master_sae_id == alleged_master
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner<'a>(master: &'a str, slave: &'a str, extra: &'a [String]) -> KeyOwnership<'a> {
        KeyOwnership {
            master_sae_id: master,
            slave_sae_id: slave,
            additional_slave_sae_ids: extra,
        }
    }

    #[test]
    fn master_can_always_access() {
        let extra = vec![];
        let o = owner("IIIIJJJJKKKKLLLL", "MMMMNNNNOOOOPPPP", &extra);
        assert!(is_authorized(&o, "IIIIJJJJKKKKLLLL", KeyOperation::MasterAccess));
        assert!(is_authorized(&o, "IIIIJJJJKKKKLLLL", KeyOperation::SlaveRetrieval));
    }

    #[test]
    fn slave_can_retrieve_but_not_master_access() {
        let extra = vec![];
        let o = owner("IIIIJJJJKKKKLLLL", "MMMMNNNNOOOOPPPP", &extra);
        assert!(is_authorized(&o, "MMMMNNNNOOOOPPPP", KeyOperation::SlaveRetrieval));
        assert!(!is_authorized(&o, "MMMMNNNNOOOOPPPP", KeyOperation::MasterAccess));
    }

    #[test]
    fn additional_slave_can_retrieve() {
        let extra = vec!["AAAA1111BBBB2222".to_string()];
        let o = owner("IIIIJJJJKKKKLLLL", "MMMMNNNNOOOOPPPP", &extra);
        assert!(is_authorized(&o, "AAAA1111BBBB2222", KeyOperation::SlaveRetrieval));
    }

    #[test]
    fn stranger_is_denied() {
        let extra = vec![];
        let o = owner("IIIIJJJJKKKKLLLL", "MMMMNNNNOOOOPPPP", &extra);
        assert!(!is_authorized(&o, "XXXXYYYYZZZZ0000", KeyOperation::SlaveRetrieval));
    }

    #[test]
    fn master_path_mismatch_is_detected() {
        let extra = vec![];
        let o = owner("IIIIJJJJKKKKLLLL", "MMMMNNNNOOOOPPPP", &extra);
        assert!(!master_matches_path(&o, "ZZZZZZZZZZZZZZZZ"));
    }
}
