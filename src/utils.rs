/// 工具函数模块
///
/// 提供 SIP 相关辅助函数：本地地址探测、Call-ID 生成、地址弱等比较、SDP 构造
use std::net::IpAddr;
use uuid::Uuid;

/// 获取第一个非回环的网络接口 IP 地址
///
/// 遍历系统所有网络接口，返回第一个非回环的 IPv4 地址
///
/// # 返回
/// - `Ok(IpAddr)` - 成功找到的 IPv4 地址
/// - `Err` - 未找到可用的 IPv4 接口
pub fn get_first_non_loopback_interface() -> Result<IpAddr, Box<dyn std::error::Error>> {
    for interface in get_if_addrs::get_if_addrs()? {
        if !interface.is_loopback() {
            match interface.addr {
                get_if_addrs::IfAddr::V4(ref addr) => return Ok(IpAddr::V4(addr.ip)),
                _ => continue,
            }
        }
    }
    Err("未找到 IPv4 接口".into())
}

/// 网络可达性探测
///
/// 呼叫前的前置检查：只要存在一个非回环 IPv4 接口即认为网络可用
pub fn network_available() -> bool {
    get_first_non_loopback_interface().is_ok()
}

/// 初始化日志
///
/// level 无效时回退到 info
pub fn initialize_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .ok();
}

/// 生成基于 UUID 的 Call-ID
///
/// 使用 UUID v4 代替随机文本，确保全局唯一性
///
/// # 参数
/// * `domain` - 可选的域名后缀
pub fn make_call_id(domain: Option<&str>) -> rsip::headers::CallId {
    let uuid = Uuid::new_v4();

    match domain {
        Some(d) => format!("{}@{}", uuid, d).into(),
        None => uuid.to_string().into(),
    }
}

/// 地址弱等比较
///
/// 比较两个 SIP 地址的 user、host、port（缺省 5060），忽略其余参数。
/// 用于识别"给自己打电话"的情况
pub fn weak_address_equal(a: &rsip::Uri, b: &rsip::Uri) -> bool {
    let user_a = a.auth.as_ref().map(|auth| auth.user.as_str());
    let user_b = b.auth.as_ref().map(|auth| auth.user.as_str());
    if user_a != user_b {
        return false;
    }

    let host_a = a.host_with_port.host.to_string().to_lowercase();
    let host_b = b.host_with_port.host.to_string().to_lowercase();
    if host_a != host_b {
        return false;
    }

    let port_a: u16 = a.host_with_port.port.clone().unwrap_or_else(|| 5060.into()).into();
    let port_b: u16 = b.host_with_port.port.clone().unwrap_or_else(|| 5060.into()).into();
    port_a == port_b
}

/// 构造最小可用的 SDP offer
///
/// 音频 m-line 固定存在，视频 m-line 按需附加。
/// AVPF 默认关闭（兼容性考虑），关闭时 profile 为 RTP/AVP
pub fn build_sdp_offer(local_ip: &IpAddr, audio_port: u16, video: bool, avpf: bool) -> String {
    let profile = if avpf { "RTP/AVPF" } else { "RTP/AVP" };
    let session_id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut sdp = format!(
        "v=0\r\n\
         o=- {sid} 0 IN IP4 {ip}\r\n\
         s=sip-bridge\r\n\
         c=IN IP4 {ip}\r\n\
         t=0 0\r\n\
         m=audio {aport} {profile} 0 8 101\r\n\
         a=rtpmap:0 PCMU/8000\r\n\
         a=rtpmap:8 PCMA/8000\r\n\
         a=rtpmap:101 telephone-event/8000\r\n\
         a=sendrecv\r\n",
        sid = session_id,
        ip = local_ip,
        aport = audio_port,
        profile = profile,
    );

    if video {
        sdp.push_str(&format!(
            "m=video {vport} {profile} 96\r\n\
             a=rtpmap:96 H264/90000\r\n\
             a=sendrecv\r\n",
            vport = audio_port + 2,
            profile = profile,
        ));
    }

    sdp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> rsip::Uri {
        s.try_into().unwrap()
    }

    #[test]
    fn test_make_call_id_with_domain() {
        let call_id = make_call_id(Some("example.com"));
        let call_id_str = call_id.to_string();

        assert!(call_id_str.contains("@example.com"));
        assert!(call_id_str.len() > 36); // UUID 长度 + @ + domain
    }

    #[test]
    fn test_make_call_id_without_domain() {
        let call_id = make_call_id(None);
        let call_id_str = call_id.to_string();

        // UUID v4 格式: 8-4-4-4-12
        assert_eq!(call_id_str.len(), 36);
        assert!(!call_id_str.contains("@"));
    }

    #[test]
    fn test_make_call_id_uniqueness() {
        let mut call_ids = std::collections::HashSet::new();

        for _ in 0..1000 {
            let call_id = make_call_id(Some("test.com"));
            call_ids.insert(call_id.to_string());
        }

        // 1000 个 Call-ID 应该都是唯一的
        assert_eq!(call_ids.len(), 1000);
    }

    #[test]
    fn test_weak_equal_same_identity() {
        assert!(weak_address_equal(
            &uri("sip:1001@192.168.1.10:5060"),
            &uri("sip:1001@192.168.1.10")
        ));
    }

    #[test]
    fn test_weak_equal_ignores_params() {
        assert!(weak_address_equal(
            &uri("sip:1001@pbx.local;transport=udp"),
            &uri("sip:1001@pbx.local")
        ));
    }

    #[test]
    fn test_weak_equal_different_user_or_port() {
        assert!(!weak_address_equal(
            &uri("sip:1001@pbx.local"),
            &uri("sip:1002@pbx.local")
        ));
        assert!(!weak_address_equal(
            &uri("sip:1001@pbx.local:5060"),
            &uri("sip:1001@pbx.local:5080")
        ));
    }

    #[test]
    fn test_sdp_offer_audio_only() {
        let ip: IpAddr = "192.168.1.5".parse().unwrap();
        let sdp = build_sdp_offer(&ip, 4000, false, false);

        assert!(sdp.contains("m=audio 4000 RTP/AVP 0 8 101"));
        assert!(!sdp.contains("m=video"));
        assert!(!sdp.contains("AVPF"));
    }

    #[test]
    fn test_sdp_offer_with_video() {
        let ip: IpAddr = "192.168.1.5".parse().unwrap();
        let sdp = build_sdp_offer(&ip, 4000, true, false);

        assert!(sdp.contains("m=audio 4000 RTP/AVP"));
        assert!(sdp.contains("m=video 4002 RTP/AVP 96"));
    }
}
