use std::cmp::Ordering;
use subscout_types::Credential;

/// Order credentials best-first: largest headroom, then earliest `reset_at`.
///
/// `headroom` lets the caller subtract in-flight reservations.
pub fn compare_by_headroom(a: (&Credential, u32), b: (&Credential, u32)) -> Ordering {
    let (ca, ha) = a;
    let (cb, hb) = b;
    let headroom_cmp = hb.cmp(&ha);
    if headroom_cmp != Ordering::Equal {
        return headroom_cmp;
    }
    let reset_cmp = ca.reset_at.cmp(&cb.reset_at);
    if reset_cmp != Ordering::Equal {
        return reset_cmp;
    }
    ca.id.cmp(&cb.id)
}

/// Index of the best selectable credential, if any has headroom left.
pub fn pick_best<F>(credentials: &[Credential], headroom: F) -> Option<usize>
where
    F: Fn(&Credential) -> u32,
{
    credentials
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_selectable())
        .map(|(i, c)| (i, c, headroom(c)))
        .filter(|(_, _, h)| *h > 0)
        .min_by(|(_, ca, ha), (_, cb, hb)| compare_by_headroom((*ca, *ha), (*cb, *hb)))
        .map(|(i, _, _)| i)
}
