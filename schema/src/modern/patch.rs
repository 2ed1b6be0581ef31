//! Build-specific corrections applied to fields before their model is chosen.

use super::field::Field;

struct FieldPatch {
    min_build: u32,
    max_build: u32,
    apply: fn(&mut Field),
}

impl FieldPatch {
    /// `0..=0` applies to every build, including an unknown one.
    fn applies_to(&self, build: Option<u32>) -> bool {
        if self.min_build == 0 && self.max_build == 0 {
            return true;
        }
        build.is_some_and(|b| (self.min_build..=self.max_build).contains(&b))
    }
}

fn set_encoder(field: &mut Field, encoder: &str) {
    field.encoding.encoder = Some(encoder.to_owned());
}

fn early_angles_and_coords(field: &mut Field) {
    match field.var_name.as_str() {
        "angExtraLocalAngles" | "angLocalAngles" | "m_angInitialAngles" | "m_angRotation"
        | "m_ragAngles" | "m_vLightDirection" => {
            if field.parent == "CBodyComponentBaseAnimatingOverlay" {
                set_encoder(field, "qangle_pitch_yaw");
            } else {
                set_encoder(field, "QAngle");
            }
        }
        "dirPrimary"
        | "localSound"
        | "m_flElasticity"
        | "m_location"
        | "m_poolOrigin"
        | "m_ragPos"
        | "m_vecEndPos"
        | "m_vecLadderDir"
        | "m_vecPlayerMountPositionBottom"
        | "m_vecPlayerMountPositionTop"
        | "m_viewtarget"
        | "m_WorldMaxs"
        | "m_WorldMins"
        | "origin"
        | "vecLocalOrigin" => set_encoder(field, "coord"),
        "m_vecLadderNormal" => set_encoder(field, "normal"),
        _ => {}
    }
}

fn early_mana_range(field: &mut Field) {
    if matches!(field.var_name.as_str(), "m_flMana" | "m_flMaxMana") {
        field.encoding.low_value = None;
        field.encoding.high_value = Some(8192.0);
    }
}

fn fixed64_ids(field: &mut Field) {
    if matches!(
        field.var_name.as_str(),
        "m_bItemWhiteList"
            | "m_bWorldTreeState"
            | "m_iPlayerIDsInControl"
            | "m_iPlayerSteamID"
            | "m_ulTeamBannerLogo"
            | "m_ulTeamBaseLogo"
            | "m_ulTeamLogo"
    ) {
        set_encoder(field, "fixed64");
    }
}

fn simulation_time(field: &mut Field) {
    if matches!(field.var_name.as_str(), "m_flSimulationTime" | "m_flAnimTime") {
        set_encoder(field, "simtime");
    }
}

const PATCHES: [FieldPatch; 4] = [
    FieldPatch {
        min_build: 0,
        max_build: 990,
        apply: early_angles_and_coords,
    },
    FieldPatch {
        min_build: 0,
        max_build: 954,
        apply: early_mana_range,
    },
    FieldPatch {
        min_build: 1016,
        max_build: 1027,
        apply: fixed64_ids,
    },
    FieldPatch {
        min_build: 0,
        max_build: 0,
        apply: simulation_time,
    },
];

/// Applies every patch whose build range covers `build`.
pub(crate) fn apply_patches(field: &mut Field, build: Option<u32>) {
    for patch in PATCHES.iter().filter(|p| p.applies_to(build)) {
        (patch.apply)(field);
    }
}
